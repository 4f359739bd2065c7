//! Analyzer seams between the HTTP service and the inference backends

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, error};

use super::types::EmotionReading;
use crate::config::FaceConfig;
use crate::engine::preprocess::crop_face;
use crate::engine::detector::FaceBox;
use crate::engine::{EmotionClassifier, FaceDetector, FaceEmotion, ModelPool};
use crate::text::{TextEmotionModel, TextModelError};

/// Emotion analysis over a decoded frame. Blocking.
pub trait ImageEmotionAnalyzer: Send + Sync {
    /// `Ok(None)` when the analysis ran but produced no usable label
    fn analyze(&self, image: &DynamicImage) -> Result<Option<EmotionReading>>;

    /// Residency of the backing models, for health reporting
    fn models_loaded(&self) -> HashMap<String, bool> {
        HashMap::new()
    }
}

/// Emotion classification of free text. Blocking.
pub trait TextEmotionClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<EmotionReading>;
}

impl TextEmotionClassifier for TextEmotionModel {
    fn classify(&self, text: &str) -> Result<EmotionReading> {
        TextEmotionModel::classify(self, text)
    }
}

/// Text model handle as decided once at startup
#[derive(Clone)]
pub enum TextModel {
    Ready(Arc<dyn TextEmotionClassifier>),
    Unavailable { reason: String },
}

impl TextModel {
    pub fn from_load(result: std::result::Result<TextEmotionModel, TextModelError>) -> Self {
        match result {
            Ok(model) => TextModel::Ready(Arc::new(model)),
            Err(e) => {
                error!("Error loading text model: {}", e);
                TextModel::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TextModel::Ready(_))
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            TextModel::Ready(_) => None,
            TextModel::Unavailable { reason } => Some(reason),
        }
    }
}

/// Face localisation step of the image pipeline
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &DynamicImage) -> Result<Vec<FaceBox>>;
}

/// Expression scoring of a face crop or a whole frame
pub trait ExpressionScorer: Send + Sync {
    fn score(&self, image: &DynamicImage) -> Result<Vec<(FaceEmotion, f32)>>;
}

impl FaceLocator for FaceDetector {
    fn locate(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        self.detect(image)
    }
}

impl ExpressionScorer for EmotionClassifier {
    fn score(&self, image: &DynamicImage) -> Result<Vec<(FaceEmotion, f32)>> {
        self.classify(image)
    }
}

/// Face detection followed by FER+ classification of the most confident
/// face. Detection is best effort: without a usable face crop the whole
/// frame is scored.
pub struct FaceEmotionAnalyzer<L = FaceDetector, S = EmotionClassifier> {
    pool: Option<Arc<ModelPool>>,
    locator: L,
    scorer: S,
    face_margin: f32,
}

impl FaceEmotionAnalyzer {
    pub fn new(pool: Arc<ModelPool>, face: &FaceConfig) -> Self {
        Self {
            locator: FaceDetector::new(pool.clone(), face.detection_threshold, face.nms_threshold),
            scorer: EmotionClassifier::new(pool.clone()),
            face_margin: face.face_margin,
            pool: Some(pool),
        }
    }
}

impl<L: FaceLocator, S: ExpressionScorer> FaceEmotionAnalyzer<L, S> {
    pub fn with_backends(locator: L, scorer: S, face_margin: f32) -> Self {
        Self {
            pool: None,
            locator,
            scorer,
            face_margin,
        }
    }
}

impl<L: FaceLocator, S: ExpressionScorer> ImageEmotionAnalyzer for FaceEmotionAnalyzer<L, S> {
    fn analyze(&self, image: &DynamicImage) -> Result<Option<EmotionReading>> {
        let faces = self.locator.locate(image)?;
        let best = faces
            .into_iter()
            .reduce(|best, f| if f.confidence > best.confidence { f } else { best });
        let face = best.and_then(|f| crop_face(image, f.x1, f.y1, f.x2, f.y2, self.face_margin));

        let scores = match face {
            Some(face) => self.scorer.score(&face)?,
            None => {
                debug!("No usable face, scoring the full frame");
                self.scorer.score(image)?
            }
        };

        Ok(EmotionReading::from_scores(
            scores
                .into_iter()
                .map(|(emotion, score)| (emotion.as_str().to_string(), score))
                .collect(),
        ))
    }

    fn models_loaded(&self) -> HashMap<String, bool> {
        self.pool
            .iter()
            .flat_map(|pool| pool.status())
            .map(|(kind, loaded)| (kind.as_str().to_string(), loaded))
            .collect()
    }
}
