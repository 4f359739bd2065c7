//! Errors surfaced at the HTTP boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::api::dto::ErrorResponse;

/// Failure of a single analysis request.
///
/// Engine code works with `anyhow`; handlers convert into this enum so only
/// a message string ever reaches the client.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    MissingInput(&'static str),

    #[error("{0}")]
    DecodeFailure(String),

    #[error("{0}")]
    AnalysisFailure(String),

    #[error("Could not detect emotion")]
    NoEmotionDetected,

    #[error("Model not loaded")]
    ModelUnavailable,
}

impl AnalysisError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::MissingInput(_) => StatusCode::BAD_REQUEST,
            // Malformed payloads stay 500, same as library failures
            AnalysisError::DecodeFailure(_)
            | AnalysisError::AnalysisFailure(_)
            | AnalysisError::NoEmotionDetected
            | AnalysisError::ModelUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::MissingInput(_) => "missing_input",
            AnalysisError::DecodeFailure(_) => "decode_failure",
            AnalysisError::AnalysisFailure(_) => "analysis_failure",
            AnalysisError::NoEmotionDetected => "no_emotion_detected",
            AnalysisError::ModelUnavailable => "model_unavailable",
        }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        AnalysisError::DecodeFailure(err.to_string())
    }

    pub fn analysis(err: impl std::fmt::Display) -> Self {
        AnalysisError::AnalysisFailure(err.to_string())
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AnalysisError::MissingInput("No image provided").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AnalysisError::decode("bad base64").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AnalysisError::ModelUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AnalysisError::NoEmotionDetected.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(AnalysisError::ModelUnavailable.to_string(), "Model not loaded");
        assert_eq!(AnalysisError::NoEmotionDetected.to_string(), "Could not detect emotion");
        assert_eq!(
            AnalysisError::MissingInput("No text provided").to_string(),
            "No text provided"
        );
        assert_eq!(AnalysisError::analysis("boom").to_string(), "boom");
    }

    #[test]
    fn test_kind() {
        assert_eq!(AnalysisError::decode("x").kind(), "decode_failure");
        assert_eq!(AnalysisError::ModelUnavailable.kind(), "model_unavailable");
    }
}
