use crate::core::video::VideoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("没有可划分的数据: corpus is empty")]
    EmptyCorpus,
    #[error("Invalid split ratios: {0}")]
    InvalidRatios(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("NPY format error: {path}: {reason}")]
    Npy { path: String, reason: String },
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
    #[error("Video error: {0}")]
    Video(#[from] VideoError),
}
