//! Service layer types

use serde::Serialize;

use crate::utils::math::argmax;

/// Outcome of one emotion analysis, in the analyzer's native scale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionReading {
    pub dominant_emotion: String,
    pub emotion_confidence: f32,
    pub scores: Vec<(String, f32)>,
}

impl EmotionReading {
    /// Pick the highest finite score. `None` when nothing usable is left.
    pub fn from_scores(scores: Vec<(String, f32)>) -> Option<Self> {
        let values: Vec<f32> = scores.iter().map(|(_, s)| *s).collect();
        let (idx, confidence) = argmax(&values)?;
        Some(Self {
            dominant_emotion: scores[idx].0.clone(),
            emotion_confidence: confidence,
            scores,
        })
    }
}

/// Health snapshot for the `/health` endpoint
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub healthy: bool,
    pub version: String,
    pub text_model_loaded: bool,
    pub text_model_error: Option<String>,
    pub models_loaded: std::collections::HashMap<String, bool>,
}
