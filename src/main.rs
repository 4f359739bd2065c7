//! Emotion Analysis Service
//!
//! Classifies emotion from face images (OpenVINO) and from text (candle
//! transformer from the Hugging Face Hub) over a small REST API.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use moodscan::api::{create_rest_router, AppState};
use moodscan::config::Config;
use moodscan::engine::ModelPool;
use moodscan::service::{EmotionService, FaceEmotionAnalyzer, TextModel};
use moodscan::text::load_text_model;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Starting Emotion Analysis Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(&Config::default_path())
        .unwrap_or_else(|e| {
            info!("Using default config ({})", e);
            Config::default()
        })
        .with_env();

    info!("Configuration loaded:");
    info!("  Listen: {}", config.bind_addr());
    info!("  OpenVINO device: {}", config.inference.device);
    info!("  Model idle timeout: {}s", config.inference.model_idle_timeout);
    info!("  Text model: {} ({:?})", config.text.model_id, config.text.device);
    if config.text.hf_token.is_none() {
        info!("  No Hugging Face token set, using anonymous hub access");
    }

    // Initialize model pool
    let pool = Arc::new(ModelPool::new(&config.inference, &config.models));

    // Start model cleanup task
    tokio::spawn(pool.clone().start_cleanup_task());

    // Load the text model; a failure only disables /analyze_text
    let text_config = config.text.clone();
    let text_model = match tokio::task::spawn_blocking(move || load_text_model(&text_config)).await {
        Ok(result) => TextModel::from_load(result),
        Err(e) => TextModel::Unavailable {
            reason: format!("text model loader panicked: {}", e),
        },
    };
    if !text_model.is_ready() {
        warn!("Text emotion endpoint disabled");
    }

    // Create emotion service
    let analyzer = Arc::new(FaceEmotionAnalyzer::new(pool.clone(), &config.face));
    let service = Arc::new(EmotionService::new(analyzer, text_model));

    // Create REST app state
    let app_state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let router = create_rest_router(app_state, config.server.body_limit);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("REST API listening on http://{}", addr);
    info!("Emotion Analysis Service is ready!");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    // Shutdown model pool
    pool.shutdown();

    info!("Goodbye!");
    Ok(())
}
