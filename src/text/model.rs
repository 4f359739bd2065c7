//! Transformer sequence classifier for text emotion
//!
//! Wraps a candle encoder plus classification head, the tokenizer configured
//! for fixed-length input, and the label vocabulary read from the model's
//! own `config.json`.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use candle_transformers::models::modernbert::{
    ClassifierConfig, ClassifierPooling, Config as ModernBertConfig,
    ModernBertForSequenceClassification,
};
use candle_transformers::models::xlm_roberta::{
    Config as XLMRobertaConfig, XLMRobertaForSequenceClassification,
};
use serde::Deserialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::loader::TextModelError;
use crate::service::types::EmotionReading;
use crate::utils::math::softmax;

/// Upper bound on the label vocabulary a config may declare
pub const MAX_LABELS: usize = 65_536;

/// Encoder families we can build a classification head for
pub enum SequenceClassifier {
    Bert {
        encoder: BertModel,
        pooler: Linear,
        classifier: Linear,
    },
    DistilBert {
        encoder: DistilBertModel,
        pre_classifier: Linear,
        classifier: Linear,
    },
    Roberta(XLMRobertaForSequenceClassification),
    ModernBert(ModernBertForSequenceClassification),
}

#[derive(Deserialize)]
struct ArchitectureProbe {
    model_type: Option<String>,
    #[serde(default)]
    classifier_pooling: Option<ClassifierPooling>,
}

impl SequenceClassifier {
    /// Build the network described by `config_json` with `num_labels` outputs
    pub fn load(config_json: &str, num_labels: usize, vb: VarBuilder) -> Result<Self, TextModelError> {
        let probe: ArchitectureProbe = serde_json::from_str(config_json)?;
        let model_type = probe.model_type.unwrap_or_default();

        match model_type.as_str() {
            "bert" => {
                let config: BertConfig = serde_json::from_str(config_json)?;
                let encoder = BertModel::load(vb.pp("bert"), &config)?;
                let pooler = linear(
                    config.hidden_size,
                    config.hidden_size,
                    vb.pp("bert").pp("pooler").pp("dense"),
                )?;
                let classifier = linear(config.hidden_size, num_labels, vb.pp("classifier"))?;
                Ok(SequenceClassifier::Bert {
                    encoder,
                    pooler,
                    classifier,
                })
            }
            "distilbert" => {
                let config: DistilBertConfig = serde_json::from_str(config_json)?;
                let encoder = DistilBertModel::load(vb.pp("distilbert"), &config)?;
                let pre_classifier = linear(config.dim, config.dim, vb.pp("pre_classifier"))?;
                let classifier = linear(config.dim, num_labels, vb.pp("classifier"))?;
                Ok(SequenceClassifier::DistilBert {
                    encoder,
                    pre_classifier,
                    classifier,
                })
            }
            "roberta" | "xlm-roberta" => {
                let config: XLMRobertaConfig = serde_json::from_str(config_json)?;
                let model = XLMRobertaForSequenceClassification::new(num_labels, &config, vb)?;
                Ok(SequenceClassifier::Roberta(model))
            }
            "modernbert" => {
                let mut config: ModernBertConfig = serde_json::from_str(config_json)?;
                ensure_classifier_config(
                    &mut config,
                    num_labels,
                    probe.classifier_pooling.unwrap_or_default(),
                );
                let model = ModernBertForSequenceClassification::load(vb, &config)?;
                Ok(SequenceClassifier::ModernBert(model))
            }
            other => Err(TextModelError::UnsupportedArchitecture(if other.is_empty() {
                "<missing model_type>".to_string()
            } else {
                other.to_string()
            })),
        }
    }

    pub fn architecture(&self) -> &'static str {
        match self {
            SequenceClassifier::Bert { .. } => "bert",
            SequenceClassifier::DistilBert { .. } => "distilbert",
            SequenceClassifier::Roberta(_) => "roberta",
            SequenceClassifier::ModernBert(_) => "modernbert",
        }
    }

    /// Logits of shape (batch, num_labels)
    fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: &Tensor,
    ) -> candle_core::Result<Tensor> {
        match self {
            SequenceClassifier::Bert {
                encoder,
                pooler,
                classifier,
            } => {
                let hidden = encoder.forward(input_ids, token_type_ids, Some(attention_mask))?;
                let cls = hidden.i((.., 0))?;
                let pooled = pooler.forward(&cls)?.tanh()?;
                classifier.forward(&pooled)
            }
            SequenceClassifier::DistilBert {
                encoder,
                pre_classifier,
                classifier,
            } => {
                // DistilBERT masks the positions that are set, i.e. padding
                let (batch, seq_len) = attention_mask.dims2()?;
                let padding = attention_mask.eq(0u32)?.reshape((batch, 1, 1, seq_len))?;
                let hidden = encoder.forward(input_ids, &padding)?;
                let cls = hidden.i((.., 0))?;
                let pooled = pre_classifier.forward(&cls)?.relu()?;
                classifier.forward(&pooled)
            }
            SequenceClassifier::Roberta(model) => {
                model.forward(input_ids, attention_mask, token_type_ids)
            }
            SequenceClassifier::ModernBert(model) => model.forward(input_ids, attention_mask),
        }
    }
}

/// ModernBERT sizes its head from `classifier_config`; keep it in step with
/// the label vocabulary. `pooling` is what the raw config asked for.
fn ensure_classifier_config(config: &mut ModernBertConfig, num_labels: usize, pooling: ClassifierPooling) {
    let matches = config
        .classifier_config
        .as_ref()
        .map(|c| c.id2label.len() == num_labels)
        .unwrap_or(false);
    if matches {
        if let Some(classifier) = config.classifier_config.as_mut() {
            classifier.classifier_pooling = pooling;
        }
        return;
    }

    let id2label: HashMap<String, String> = (0..num_labels)
        .map(|i| (i.to_string(), format!("LABEL_{i}")))
        .collect();
    let label2id = id2label
        .iter()
        .map(|(k, v)| (v.clone(), k.clone()))
        .collect();
    config.classifier_config = Some(ClassifierConfig {
        id2label,
        label2id,
        classifier_pooling: pooling,
    });
}

#[derive(Deserialize)]
struct LabelConfig {
    #[serde(default)]
    id2label: HashMap<String, String>,
    #[serde(default)]
    num_labels: Option<usize>,
}

/// Label vocabulary indexed by class id. Sized by the model config; ids the
/// config does not name become `LABEL_<i>`.
pub fn labels_from_config(config_json: &str) -> Result<Vec<String>, TextModelError> {
    let config: LabelConfig = serde_json::from_str(config_json)?;

    let mut named: Vec<(usize, String)> = Vec::with_capacity(config.id2label.len());
    for (id, label) in config.id2label {
        let idx: usize = id
            .parse()
            .map_err(|_| TextModelError::InvalidLabels(format!("non-numeric label id {id:?}")))?;
        if idx >= MAX_LABELS {
            return Err(TextModelError::InvalidLabels(format!(
                "label id {idx} exceeds the limit of {MAX_LABELS}"
            )));
        }
        named.push((idx, label));
    }

    let declared = config.num_labels.unwrap_or(0);
    if declared > MAX_LABELS {
        return Err(TextModelError::InvalidLabels(format!(
            "num_labels {declared} exceeds the limit of {MAX_LABELS}"
        )));
    }

    let count = named
        .iter()
        .filter_map(|(id, _)| id.checked_add(1))
        .max()
        .unwrap_or(0)
        .max(declared);
    if count == 0 {
        return Err(TextModelError::InvalidLabels(
            "model config defines no labels".to_string(),
        ));
    }

    let mut labels: Vec<String> = (0..count).map(|i| format!("LABEL_{i}")).collect();
    for (id, label) in named {
        labels[id] = label;
    }
    Ok(labels)
}

/// Truncate and pad every encoding to exactly `max_length` tokens, reusing
/// the tokenizer's own pad token when it declares one.
pub fn configure_tokenizer(tokenizer: &mut Tokenizer, max_length: usize) -> Result<(), TextModelError> {
    let mut padding = tokenizer.get_padding().cloned().unwrap_or_else(|| {
        let (pad_id, pad_token) = ["[PAD]", "<pad>"]
            .iter()
            .find_map(|t| tokenizer.token_to_id(t).map(|id| (id, t.to_string())))
            .unwrap_or((0, "[PAD]".to_string()));
        PaddingParams {
            pad_id,
            pad_token,
            ..Default::default()
        }
    });
    padding.strategy = PaddingStrategy::Fixed(max_length);
    tokenizer.with_padding(Some(padding));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| TextModelError::Tokenizer(e.to_string()))?;
    Ok(())
}

/// Softmax over `(1, num_labels)` logits, arg-max, label lookup
pub fn reading_from_logits(logits: &Tensor, labels: &[String]) -> Result<EmotionReading> {
    let logits: Vec<f32> = logits.squeeze(0)?.to_dtype(DType::F32)?.to_vec1()?;
    let probs = softmax(&logits);

    let scores = probs
        .into_iter()
        .enumerate()
        .map(|(idx, p)| {
            let label = labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("LABEL_{idx}"));
            (label, p)
        })
        .collect();

    EmotionReading::from_scores(scores).ok_or_else(|| anyhow!("model produced no usable scores"))
}

/// Loaded text emotion model, read-only after construction
pub struct TextEmotionModel {
    tokenizer: Tokenizer,
    classifier: SequenceClassifier,
    labels: Vec<String>,
    device: Device,
}

impl TextEmotionModel {
    pub fn new(
        tokenizer: Tokenizer,
        classifier: SequenceClassifier,
        labels: Vec<String>,
        device: Device,
    ) -> Self {
        Self {
            tokenizer,
            classifier,
            labels,
            device,
        }
    }

    /// Classify one text. Candle tensors carry no autograd tape, so this is
    /// a pure inference pass.
    pub fn classify(&self, text: &str) -> Result<EmotionReading> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let logits = self
            .classifier
            .forward(&input_ids, &attention_mask, &token_type_ids)?;
        let logits = logits.to_device(&Device::Cpu)?;

        reading_from_logits(&logits, &self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[PAD]": 0, "[UNK]": 1, "i": 2, "am": 3, "so": 4, "happy": 5, "today": 6},
            "unk_token": "[UNK]"
        }
    }"#;

    const TINY_BERT: &str = r#"{
        "model_type": "bert",
        "vocab_size": 7, "hidden_size": 8, "num_hidden_layers": 1,
        "num_attention_heads": 2, "intermediate_size": 16, "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0, "max_position_embeddings": 16,
        "type_vocab_size": 2, "initializer_range": 0.02, "layer_norm_eps": 1e-12,
        "pad_token_id": 0,
        "id2label": {"0": "anger", "1": "joy", "2": "sadness"}
    }"#;

    const TINY_ROBERTA: &str = r#"{
        "model_type": "roberta",
        "vocab_size": 7, "hidden_size": 8, "num_hidden_layers": 1,
        "num_attention_heads": 2, "intermediate_size": 16, "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0, "attention_probs_dropout_prob": 0.0,
        "position_embedding_type": "absolute", "max_position_embeddings": 16,
        "type_vocab_size": 1, "layer_norm_eps": 1e-5, "pad_token_id": 0,
        "id2label": {"0": "anger", "1": "joy", "2": "sadness"}
    }"#;

    const TINY_DISTILBERT: &str = r#"{
        "model_type": "distilbert",
        "vocab_size": 7, "dim": 8, "n_layers": 1, "n_heads": 2, "hidden_dim": 16,
        "activation": "gelu", "max_position_embeddings": 16,
        "initializer_range": 0.02, "pad_token_id": 0,
        "id2label": {"0": "anger", "1": "joy", "2": "sadness"}
    }"#;

    const TINY_MODERNBERT: &str = r#"{
        "model_type": "modernbert",
        "vocab_size": 7, "hidden_size": 8, "num_hidden_layers": 1,
        "num_attention_heads": 2, "intermediate_size": 16,
        "max_position_embeddings": 16, "layer_norm_eps": 1e-5, "pad_token_id": 0,
        "global_attn_every_n_layers": 1, "global_rope_theta": 10000.0,
        "local_attention": 8, "local_rope_theta": 10000.0,
        "classifier_pooling": "mean",
        "id2label": {"0": "anger", "1": "joy"},
        "label2id": {"anger": 0, "joy": 1}
    }"#;

    /// Zero-weight model: every logit is equal, so the first label wins
    fn tiny_model(config_json: &str) -> TextEmotionModel {
        let labels = labels_from_config(config_json).unwrap();
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let classifier = SequenceClassifier::load(config_json, labels.len(), vb)
            .map_err(|e| e.to_string())
            .unwrap();
        let mut tokenizer = Tokenizer::from_str(WORD_LEVEL_TOKENIZER).unwrap();
        configure_tokenizer(&mut tokenizer, 8).unwrap();
        TextEmotionModel::new(tokenizer, classifier, labels, Device::Cpu)
    }

    fn assert_classifies(config_json: &str, architecture: &str) {
        let model = tiny_model(config_json);
        assert_eq!(model.classifier.architecture(), architecture);

        let first = model.classify("i am so happy today").unwrap();
        assert_eq!(first.dominant_emotion, "anger");
        assert!(model.labels.contains(&first.dominant_emotion));
        assert!(first.emotion_confidence > 0.0 && first.emotion_confidence <= 1.0);
        assert!((first.emotion_confidence - 1.0 / 3.0).abs() < 1e-5);

        let second = model.classify("i am so happy today").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_labels_from_config() {
        let labels = labels_from_config(
            r#"{"model_type": "bert", "id2label": {"0": "anger", "1": "joy", "2": "sadness"}}"#,
        )
        .unwrap();
        assert_eq!(labels, vec!["anger", "joy", "sadness"]);
    }

    #[test]
    fn test_labels_fill_gaps() {
        let labels = labels_from_config(r#"{"id2label": {"0": "calm", "3": "rage"}}"#).unwrap();
        assert_eq!(labels, vec!["calm", "LABEL_1", "LABEL_2", "rage"]);
    }

    #[test]
    fn test_labels_sized_by_num_labels() {
        let labels = labels_from_config(r#"{"num_labels": 26}"#).unwrap();
        assert_eq!(labels.len(), 26);
        assert_eq!(labels[25], "LABEL_25");
    }

    #[test]
    fn test_labels_rejects_empty_and_bad_ids() {
        assert!(labels_from_config(r#"{"model_type": "bert"}"#).is_err());
        assert!(labels_from_config(r#"{"id2label": {"first": "joy"}}"#).is_err());
    }

    #[test]
    fn test_labels_rejects_oversized_ids() {
        let max = format!(r#"{{"id2label": {{"{}": "joy"}}}}"#, usize::MAX);
        assert!(matches!(
            labels_from_config(&max),
            Err(TextModelError::InvalidLabels(_))
        ));
        assert!(labels_from_config(r#"{"id2label": {"4000000000": "joy"}}"#).is_err());
        assert!(labels_from_config(r#"{"num_labels": 4000000000}"#).is_err());

        let edge = format!(r#"{{"id2label": {{"{}": "joy"}}}}"#, MAX_LABELS - 1);
        assert_eq!(labels_from_config(&edge).unwrap().len(), MAX_LABELS);
    }

    #[test]
    fn test_reading_is_max_softmax_probability() {
        let labels: Vec<String> = ["anger", "joy", "sadness"].iter().map(|s| s.to_string()).collect();
        let logits = Tensor::new(&[[1.0f32, 3.0, 2.0]], &Device::Cpu).unwrap();

        let reading = reading_from_logits(&logits, &labels).unwrap();
        assert_eq!(reading.dominant_emotion, "joy");

        let expected = softmax(&[1.0, 3.0, 2.0]);
        let max = expected.iter().cloned().fold(f32::MIN, f32::max);
        assert!((reading.emotion_confidence - max).abs() < 1e-6);
        assert!(reading.emotion_confidence > 0.0 && reading.emotion_confidence <= 1.0);

        let total: f32 = reading.scores.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_reading_labels_beyond_vocabulary() {
        let logits = Tensor::new(&[[0.0f32, 5.0]], &Device::Cpu).unwrap();
        let reading = reading_from_logits(&logits, &["only".to_string()]).unwrap();
        assert_eq!(reading.dominant_emotion, "LABEL_1");
    }

    #[test]
    fn test_configure_tokenizer_pads_to_fixed_length() {
        let mut tokenizer = Tokenizer::from_str(WORD_LEVEL_TOKENIZER).unwrap();
        configure_tokenizer(&mut tokenizer, 8).unwrap();

        let encoding = tokenizer.encode("i am so happy today", true).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 3, 4, 5, 6, 0, 0, 0]);
        assert_eq!(encoding.get_attention_mask(), &[1, 1, 1, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_configure_tokenizer_truncates() {
        let mut tokenizer = Tokenizer::from_str(WORD_LEVEL_TOKENIZER).unwrap();
        configure_tokenizer(&mut tokenizer, 4).unwrap();

        let encoding = tokenizer.encode("i am so happy today i am so happy", true).unwrap();
        assert_eq!(encoding.get_ids().len(), 4);
        assert_eq!(encoding.get_attention_mask(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_bert_classifies_end_to_end() {
        assert_classifies(TINY_BERT, "bert");
    }

    #[test]
    fn test_roberta_classifies_end_to_end() {
        assert_classifies(TINY_ROBERTA, "roberta");
    }

    #[test]
    fn test_distilbert_classifies_end_to_end() {
        assert_classifies(TINY_DISTILBERT, "distilbert");
    }

    #[test]
    fn test_modernbert_keeps_configured_pooling() {
        let mut config: ModernBertConfig = serde_json::from_str(TINY_MODERNBERT).unwrap();
        ensure_classifier_config(&mut config, 2, ClassifierPooling::MEAN);
        let classifier = config.classifier_config.unwrap();
        assert_eq!(classifier.classifier_pooling, ClassifierPooling::MEAN);
        assert_eq!(classifier.id2label.len(), 2);

        let probe: ArchitectureProbe = serde_json::from_str(TINY_MODERNBERT).unwrap();
        assert_eq!(probe.classifier_pooling, Some(ClassifierPooling::MEAN));
    }

    #[test]
    fn test_unsupported_architecture() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let err = SequenceClassifier::load(r#"{"model_type": "gpt2"}"#, 3, vb).err().unwrap();
        assert!(matches!(err, TextModelError::UnsupportedArchitecture(ref t) if t == "gpt2"));
    }
}
