use crate::core::video::VideoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Invalid classifier output: {0}")]
    InvalidOutput(String),
    #[error("Invalid taxonomy: {0}")]
    InvalidTaxonomy(String),
    #[error("Classifier error: {0}")]
    Classifier(String),
    #[error("Video error: {0}")]
    Video(#[from] VideoError),
}
