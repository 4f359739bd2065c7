//! Text emotion classification backed by a Hugging Face transformer

pub mod device;
pub mod loader;
pub mod model;

pub use loader::{load_text_model, TextModelError};
pub use model::TextEmotionModel;
