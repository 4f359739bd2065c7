//! Startup loader for the text emotion model
//!
//! Fetches config, tokenizer and weights from the Hugging Face Hub, picks a
//! compute device and assembles a [`TextEmotionModel`]. The caller decides
//! what a failure means; the service keeps running with the text endpoint
//! disabled.

use std::path::PathBuf;
use std::time::Instant;

use candle_core::DType;
use candle_nn::VarBuilder;
use hf_hub::api::sync::{ApiBuilder, ApiError, ApiRepo};
use hf_hub::{Repo, RepoType};
use thiserror::Error;
use tokenizers::Tokenizer;
use tracing::info;

use super::device::{device_name, select_device};
use super::model::{configure_tokenizer, labels_from_config, SequenceClassifier, TextEmotionModel};
use crate::config::TextConfig;

#[derive(Debug, Error)]
pub enum TextModelError {
    #[error("model hub request failed: {0}")]
    Hub(#[from] ApiError),

    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid label vocabulary: {0}")]
    InvalidLabels(String),

    #[error("unsupported model architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("failed to build model: {0}")]
    Weights(#[from] candle_core::Error),
}

/// Local paths of the files a classifier needs
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn fetch(repo: &ApiRepo) -> Result<Self, TextModelError> {
        let config = repo.get("config.json")?;
        let tokenizer = repo.get("tokenizer.json")?;
        let weights = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))?;
        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

/// Download (or reuse from the local cache) and build the text model.
/// Blocking: call from a blocking context.
pub fn load_text_model(config: &TextConfig) -> Result<TextEmotionModel, TextModelError> {
    let start = Instant::now();
    info!("Loading text model {}", config.model_id);

    let mut builder = ApiBuilder::new().with_progress(false);
    if let Some(token) = &config.hf_token {
        builder = builder.with_token(Some(token.clone()));
    }
    let api = builder.build()?;

    let repo = match &config.revision {
        Some(revision) => Repo::with_revision(config.model_id.clone(), RepoType::Model, revision.clone()),
        None => Repo::new(config.model_id.clone(), RepoType::Model),
    };
    let files = ModelFiles::fetch(&api.repo(repo))?;

    let config_json = std::fs::read_to_string(&files.config)?;
    let labels = labels_from_config(&config_json)?;

    let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
        .map_err(|e| TextModelError::Tokenizer(e.to_string()))?;
    configure_tokenizer(&mut tokenizer, config.max_length)?;

    let device = select_device(config.device);
    let vb = if files.weights.extension().is_some_and(|e| e == "safetensors") {
        unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)? }
    } else {
        VarBuilder::from_pth(&files.weights, DType::F32, &device)?
    };
    let classifier = SequenceClassifier::load(&config_json, labels.len(), vb)?;

    info!(
        "Text model {} ({}, {} labels) loaded on {} in {:?}",
        config.model_id,
        classifier.architecture(),
        labels.len(),
        device_name(&device),
        start.elapsed()
    );

    Ok(TextEmotionModel::new(tokenizer, classifier, labels, device))
}
