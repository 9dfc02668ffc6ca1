use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("帧数不足: {path} 只有 {total_frames} 帧, 需要 {required} 帧")]
    InsufficientFrames {
        path: String,
        total_frames: u64,
        required: usize,
    },
    #[error("帧读取失败 (idx: {index}): {path}: {reason}")]
    FrameReadError {
        path: String,
        index: u64,
        reason: String,
    },
    #[error("无法打开视频流: {path}: {reason}")]
    StreamUnavailable { path: String, reason: String },
    #[error("Invalid frame buffer: {0}")]
    InvalidFrame(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
}

impl VideoError {
    /// 单个片段级别的失败，构建语料时可以跳过该片段继续
    pub fn is_clip_recoverable(&self) -> bool {
        matches!(
            self,
            VideoError::InsufficientFrames { .. }
                | VideoError::FrameReadError { .. }
                | VideoError::StreamUnavailable { .. }
        )
    }
}
