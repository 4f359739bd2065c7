//! Emotion Service - request orchestration
//!
//! Turns raw request payloads into readings: decodes input, runs the
//! analyzers on the blocking pool and maps every failure onto
//! [`AnalysisError`].

use std::sync::Arc;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use tracing::info;

use crate::engine::preprocess::decode_image;
use crate::error::AnalysisError;

use super::analyzer::{ImageEmotionAnalyzer, TextModel};
use super::types::{EmotionReading, HealthResult};

/// Standard alphabet, padding optional
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64 image payload. Accepts a `data:<mime>;base64,` prefix
/// and embedded whitespace.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, AnalysisError> {
    let body = match payload.trim_start().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| AnalysisError::decode("Malformed data URL"))?,
        None => payload,
    };
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    PAYLOAD_ENGINE
        .decode(compact.as_bytes())
        .map_err(|e| AnalysisError::decode(format!("Invalid base64 image: {}", e)))
}

/// Emotion analysis service
pub struct EmotionService {
    image: Arc<dyn ImageEmotionAnalyzer>,
    text: TextModel,
}

impl EmotionService {
    pub fn new(image: Arc<dyn ImageEmotionAnalyzer>, text: TextModel) -> Self {
        Self { image, text }
    }

    pub fn text_model(&self) -> &TextModel {
        &self.text
    }

    /// Analyze a base64 encoded image
    pub async fn analyze_image(&self, payload: &str) -> Result<EmotionReading, AnalysisError> {
        let bytes = decode_base64_payload(payload)?;

        let analyzer = self.image.clone();
        let reading = tokio::task::spawn_blocking(move || {
            let image = decode_image(&bytes).map_err(|e| AnalysisError::decode(format!("{:#}", e)))?;
            analyzer
                .analyze(&image)
                .map_err(|e| AnalysisError::analysis(format!("{:#}", e)))
        })
        .await
        .map_err(AnalysisError::analysis)??
        .ok_or(AnalysisError::NoEmotionDetected)?;

        info!(
            "Detected emotion (image): {}, confidence: {}",
            reading.dominant_emotion, reading.emotion_confidence
        );
        Ok(reading)
    }

    /// Classify a piece of text
    pub async fn analyze_text(&self, text: String) -> Result<EmotionReading, AnalysisError> {
        let classifier = match &self.text {
            TextModel::Ready(classifier) => classifier.clone(),
            TextModel::Unavailable { .. } => return Err(AnalysisError::ModelUnavailable),
        };

        let reading = tokio::task::spawn_blocking(move || classifier.classify(&text))
            .await
            .map_err(AnalysisError::analysis)?
            .map_err(|e| AnalysisError::analysis(format!("{:#}", e)))?;

        info!(
            "Detected emotion (text): {}, confidence: {}",
            reading.dominant_emotion, reading.emotion_confidence
        );
        Ok(reading)
    }

    /// Get service health
    pub fn health(&self) -> HealthResult {
        HealthResult {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            text_model_loaded: self.text.is_ready(),
            text_model_error: self.text.unavailable_reason().map(str::to_string),
            models_loaded: self.image.models_loaded(),
        }
    }
}
