//! Image inference engine
//!
//! OpenVINO-backed face detection and facial expression classification:
//! - Models compiled lazily and unloaded when idle
//! - Letterboxed SCRFD detection with NMS
//! - FER+ expression scores on the best face or the whole frame

pub mod pool;
pub mod infer;
pub mod detector;
pub mod emotion;
pub mod preprocess;

pub use pool::ModelPool;
pub use detector::FaceDetector;
pub use emotion::{EmotionClassifier, FaceEmotion};
