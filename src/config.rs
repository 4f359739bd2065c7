//! Emotion service configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable holding the optional Hugging Face Hub token
pub const HF_TOKEN_ENV: &str = "HUGGINGFACE_TOKEN";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "MOODSCAN_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub face: FaceConfig,
    pub text: TextConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body, in bytes
    pub body_limit: usize,
}

/// OpenVINO settings for the image models
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub device: String,
    /// Seconds a compiled model may stay idle before it is unloaded
    pub model_idle_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub emotion: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub detection_threshold: f32,
    pub nms_threshold: f32,
    /// Extra context around a detected face, as a fraction of the box size
    pub face_margin: f32,
}

/// Which candle device the text model should run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub model_id: String,
    pub revision: Option<String>,
    pub max_length: usize,
    pub device: DevicePreference,
    /// Filled from `HUGGINGFACE_TOKEN`, never read from the file
    #[serde(skip)]
    pub hf_token: Option<String>,
}

impl std::fmt::Debug for TextConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextConfig")
            .field("model_id", &self.model_id)
            .field("revision", &self.revision)
            .field("max_length", &self.max_length)
            .field("device", &self.device)
            .field("hf_token", &self.hf_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
    }

    /// Apply environment overrides on top of the file values
    pub fn with_env(mut self) -> Self {
        self.text.hf_token = std::env::var(HF_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            body_limit: 20 * 1024 * 1024,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            model_idle_timeout: 300,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            detector: PathBuf::from("models/scrfd_10g_kps.onnx"),
            emotion: PathBuf::from("models/emotion_ferplus.onnx"),
        }
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            nms_threshold: 0.4,
            face_margin: 0.1,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            model_id: "BSNSSWB/emotion-model".to_string(),
            revision: None,
            max_length: 128,
            device: DevicePreference::Auto,
            hf_token: None,
        }
    }
}
