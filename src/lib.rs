//! Emotion Analysis Service Library

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod text;
pub mod utils;

pub use config::Config;
pub use error::AnalysisError;
