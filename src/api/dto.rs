//! REST API request/response data transfer objects

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::service::EmotionReading;
use crate::utils::math::unix_time;

/// Body of a request as a JSON object. Anything else counts as empty.
fn parse_object(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Analyze image request (JSON)
#[derive(Debug, Default)]
pub struct AnalyzeImageRequest {
    pub image: Option<Value>,
}

impl AnalyzeImageRequest {
    pub fn parse(body: &[u8]) -> Self {
        Self {
            image: parse_object(body).remove("image"),
        }
    }
}

/// Analyze text request (JSON)
#[derive(Debug, Default)]
pub struct AnalyzeTextRequest {
    pub text: Option<Value>,
}

impl AnalyzeTextRequest {
    pub fn parse(body: &[u8]) -> Self {
        Self {
            text: parse_object(body).remove("text"),
        }
    }
}

/// Analysis response, shared by both endpoints
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub time: f64,
    pub dominant_emotion: String,
    pub emotion_confidence: f64,
}

impl From<EmotionReading> for AnalysisResponse {
    fn from(reading: EmotionReading) -> Self {
        Self {
            time: unix_time(),
            dominant_emotion: reading.dominant_emotion,
            emotion_confidence: f64::from(reading.emotion_confidence),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub text_model_loaded: bool,
    pub text_model_error: Option<String>,
    pub models_loaded: HashMap<String, bool>,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_requests() {
        let req = AnalyzeImageRequest::parse(br#"{"image": "abc"}"#);
        assert_eq!(req.image, Some(json!("abc")));

        let req = AnalyzeTextRequest::parse(br#"{"text": 42}"#);
        assert_eq!(req.text, Some(json!(42)));

        assert!(AnalyzeImageRequest::parse(b"").image.is_none());
        assert!(AnalyzeImageRequest::parse(b"not json").image.is_none());
        assert!(AnalyzeTextRequest::parse(br#"["text"]"#).text.is_none());
    }

    #[test]
    fn test_response_shape() {
        let reading = EmotionReading::from_scores(vec![("joy".to_string(), 0.75)]).unwrap();
        let value = serde_json::to_value(AnalysisResponse::from(reading)).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["dominant_emotion"], "joy");
        assert_eq!(obj["emotion_confidence"], 0.75);
        assert!(obj["time"].as_f64().unwrap() > 0.0);

        let err = serde_json::to_value(ErrorResponse::new("No image provided")).unwrap();
        assert_eq!(err, json!({"error": "No image provided"}));
    }
}
