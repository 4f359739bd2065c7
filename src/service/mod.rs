//! Service layer module

pub mod analyzer;
pub mod emotion_service;
pub mod types;

pub use analyzer::{FaceEmotionAnalyzer, ImageEmotionAnalyzer, TextEmotionClassifier, TextModel};
pub use emotion_service::EmotionService;
pub use types::*;
