//! Facial expression classifier (FER+)

use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;

use super::infer::{read_output, run_inference};
use super::pool::{ModelKind, ModelPool};
use super::preprocess::prepare_emotion_input;
use crate::utils::math::softmax;

/// FER+ expression classes, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceEmotion {
    Neutral,
    Happy,
    Surprise,
    Sad,
    Angry,
    Disgust,
    Fear,
    Contempt,
}

impl FaceEmotion {
    pub const ALL: [FaceEmotion; 8] = [
        FaceEmotion::Neutral,
        FaceEmotion::Happy,
        FaceEmotion::Surprise,
        FaceEmotion::Sad,
        FaceEmotion::Angry,
        FaceEmotion::Disgust,
        FaceEmotion::Fear,
        FaceEmotion::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaceEmotion::Neutral => "neutral",
            FaceEmotion::Happy => "happy",
            FaceEmotion::Surprise => "surprise",
            FaceEmotion::Sad => "sad",
            FaceEmotion::Angry => "angry",
            FaceEmotion::Disgust => "disgust",
            FaceEmotion::Fear => "fear",
            FaceEmotion::Contempt => "contempt",
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

/// Turn raw logits into per-class percentages (0-100).
/// Outputs beyond the known classes are dropped.
pub fn scores_from_logits(logits: &[f32]) -> Vec<(FaceEmotion, f32)> {
    softmax(logits)
        .into_iter()
        .enumerate()
        .filter_map(|(idx, p)| FaceEmotion::from_index(idx).map(|e| (e, p * 100.0)))
        .collect()
}

pub struct EmotionClassifier {
    pool: Arc<ModelPool>,
}

impl EmotionClassifier {
    pub fn new(pool: Arc<ModelPool>) -> Self {
        Self { pool }
    }

    /// Score every expression for a face crop (or a whole frame)
    pub fn classify(&self, face: &DynamicImage) -> Result<Vec<(FaceEmotion, f32)>> {
        let input = prepare_emotion_input(face);
        let model = self.pool.get_model(ModelKind::Emotion)?;
        let request = run_inference(&model, &input)?;

        let logits = read_output(&request.get_output_tensor()?)?;
        tracing::debug!("Emotion model raw output: {:?}", logits);

        Ok(scores_from_logits(&logits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index() {
        assert_eq!(FaceEmotion::from_index(0), Some(FaceEmotion::Neutral));
        assert_eq!(FaceEmotion::from_index(1), Some(FaceEmotion::Happy));
        assert_eq!(FaceEmotion::from_index(7), Some(FaceEmotion::Contempt));
        assert_eq!(FaceEmotion::from_index(8), None);
    }

    #[test]
    fn test_labels() {
        let labels: Vec<&str> = FaceEmotion::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(
            labels,
            vec!["neutral", "happy", "surprise", "sad", "angry", "disgust", "fear", "contempt"]
        );
    }

    #[test]
    fn test_scores_are_percentages() {
        let scores = scores_from_logits(&[0.1, 4.0, 0.3, 0.0, -1.0, 0.2, 0.5, 0.0]);
        assert_eq!(scores.len(), 8);

        let total: f32 = scores.iter().map(|(_, s)| s).sum();
        assert!((total - 100.0).abs() < 1e-3);

        let (best, score) = scores
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert_eq!(best, FaceEmotion::Happy);
        assert!(score > 50.0 && score <= 100.0);
    }

    #[test]
    fn test_scores_drop_unknown_outputs() {
        let scores = scores_from_logits(&[0.0; 10]);
        assert_eq!(scores.len(), 8);
    }

    #[test]
    fn test_scores_empty_output() {
        assert!(scores_from_logits(&[]).is_empty());
    }
}
