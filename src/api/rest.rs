//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::AnalysisError;
use crate::service::EmotionService;

use super::dto::*;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<EmotionService>,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_rest_router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/analyze", post(analyze_image_handler))
        .route("/analyze_text", post(analyze_text_handler))
        .route("/health", get(health_handler))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn log_failure(endpoint: &str, err: AnalysisError) -> AnalysisError {
    error!("{} failed ({}): {}", endpoint, err.kind(), err);
    err
}

/// Analyze emotion in a base64 encoded image
async fn analyze_image_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    let request = AnalyzeImageRequest::parse(&body);

    let payload = match request.image {
        None => return Err(AnalysisError::MissingInput("No image provided")),
        Some(Value::String(payload)) => payload,
        Some(_) => {
            return Err(log_failure(
                "Image analysis",
                AnalysisError::decode("image must be a base64 encoded string"),
            ))
        }
    };

    let reading = state
        .service
        .analyze_image(&payload)
        .await
        .map_err(|e| log_failure("Image analysis", e))?;

    Ok(Json(reading.into()))
}

/// Analyze emotion in a piece of text
async fn analyze_text_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    if !state.service.text_model().is_ready() {
        return Err(log_failure("Text analysis", AnalysisError::ModelUnavailable));
    }

    let request = AnalyzeTextRequest::parse(&body);

    let text = match request.text {
        None => return Err(AnalysisError::MissingInput("No text provided")),
        Some(Value::String(text)) => text,
        Some(_) => {
            return Err(log_failure(
                "Text analysis",
                AnalysisError::analysis("text must be a string"),
            ))
        }
    };

    let reading = state
        .service
        .analyze_text(text)
        .await
        .map_err(|e| log_failure("Text analysis", e))?;

    Ok(Json(reading.into()))
}

/// Health check
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        healthy: health.healthy,
        version: health.version,
        text_model_loaded: health.text_model_loaded,
        text_model_error: health.text_model_error,
        models_loaded: health.models_loaded,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
