//! 视频源抽象
//!
//! - `FrameSource`：可随机访问（seek + decode），用于定长抽帧
//! - `FrameStream`：顺序读取，`Ok(None)` 表示流结束
//!
//! 片段以"帧序列目录"形式存放（编号图片 + 可选的 `clip.json`），
//! 原生层解码出的帧则通过 `MemoryClip` 传入。

use super::error::VideoError;
use super::frame::{Frame, RawFrame};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FPS: f64 = 30.0;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];
const CLIP_META_FILE: &str = "clip.json";

/// 视频片段引用，发现后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct VideoAsset {
    pub path: PathBuf,
    pub total_frames: u64,
    pub fps: f64,
}

impl VideoAsset {
    pub fn timestamp_ms(&self, index: u64) -> u64 {
        if self.fps > 0.0 {
            (index as f64 * 1000.0 / self.fps) as u64
        } else {
            0
        }
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

pub trait FrameSource {
    fn asset(&self) -> &VideoAsset;

    /// 定位并解码第 `index` 帧
    fn read_frame(&mut self, index: u64) -> Result<Frame, VideoError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn asset(&self) -> &VideoAsset {
        (**self).asset()
    }

    fn read_frame(&mut self, index: u64) -> Result<Frame, VideoError> {
        (**self).read_frame(index)
    }
}

pub trait FrameStream {
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;
}

/// 把可随机访问的源适配为顺序流
pub struct SequentialReader<S> {
    source: S,
    cursor: u64,
}

impl<S: FrameSource> SequentialReader<S> {
    pub fn new(source: S) -> Self {
        Self { source, cursor: 0 }
    }

    pub fn asset(&self) -> &VideoAsset {
        self.source.asset()
    }
}

impl<S: FrameSource> FrameStream for SequentialReader<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        if self.cursor >= self.source.asset().total_frames {
            return Ok(None);
        }
        let frame = self.source.read_frame(self.cursor)?;
        self.cursor += 1;
        Ok(Some(frame))
    }
}

#[derive(Debug, Deserialize)]
struct ClipMeta {
    #[serde(default = "default_fps")]
    fps: f64,
}

fn default_fps() -> f64 {
    DEFAULT_FPS
}

/// 帧序列目录：`frame_00000.png`, `frame_00001.png`, ...（按文件名排序）
pub struct ImageSequence {
    asset: VideoAsset,
    frame_paths: Vec<PathBuf>,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self, VideoError> {
        let unavailable = |reason: String| VideoError::StreamUnavailable {
            path: dir.display().to_string(),
            reason,
        };

        if !dir.is_dir() {
            return Err(unavailable("not a clip directory".to_string()));
        }

        let entries = fs::read_dir(dir).map_err(|e| unavailable(e.to_string()))?;
        let mut frame_paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| unavailable(e.to_string()))?.path();
            if path.is_file() && is_image_file(&path) {
                frame_paths.push(path);
            }
        }
        frame_paths.sort();

        if frame_paths.is_empty() {
            return Err(unavailable("no frame images found".to_string()));
        }

        let fps = read_fps(dir).map_err(|e| unavailable(e))?;

        debug!(
            "📂 Opened image sequence {:?}: {} frames @ {:.1} fps",
            dir,
            frame_paths.len(),
            fps
        );

        Ok(Self {
            asset: VideoAsset {
                path: dir.to_path_buf(),
                total_frames: frame_paths.len() as u64,
                fps,
            },
            frame_paths,
        })
    }
}

impl FrameSource for ImageSequence {
    fn asset(&self) -> &VideoAsset {
        &self.asset
    }

    fn read_frame(&mut self, index: u64) -> Result<Frame, VideoError> {
        let read_error = |reason: String| VideoError::FrameReadError {
            path: self.asset.display_path(),
            index,
            reason,
        };

        let path = self
            .frame_paths
            .get(index as usize)
            .ok_or_else(|| read_error("index out of range".to_string()))?;
        let img = image::open(path)
            .map_err(|e| read_error(e.to_string()))?
            .to_rgba8();
        let (width, height) = img.dimensions();

        Ok(Frame::new(
            width,
            height,
            img.into_raw(),
            self.asset.timestamp_ms(index),
            index,
        ))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn read_fps(dir: &Path) -> Result<f64, String> {
    let meta_path = dir.join(CLIP_META_FILE);
    if !meta_path.exists() {
        return Ok(DEFAULT_FPS);
    }
    let text = fs::read_to_string(&meta_path).map_err(|e| e.to_string())?;
    let meta: ClipMeta = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    Ok(meta.fps)
}

/// 内存中的片段（原生层已解码的帧）
pub struct MemoryClip {
    asset: VideoAsset,
    frames: Vec<Frame>,
    unreadable: HashSet<u64>,
}

impl MemoryClip {
    pub fn new(path: impl Into<PathBuf>, frames: Vec<Frame>, fps: f64) -> Self {
        Self {
            asset: VideoAsset {
                path: path.into(),
                total_frames: frames.len() as u64,
                fps,
            },
            frames,
            unreadable: HashSet::new(),
        }
    }

    /// 原生解码器输出的 YUV420 帧
    pub fn from_raw_frames(
        path: impl Into<PathBuf>,
        raw: Vec<RawFrame>,
        fps: f64,
    ) -> Result<Self, VideoError> {
        let frames = raw
            .iter()
            .map(RawFrame::to_rgba)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(path, frames, fps))
    }

    /// 原生解码器输出的 BGR 帧，每帧 `width * height * 3` 字节
    pub fn from_bgr_frames(
        path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        buffers: Vec<Vec<u8>>,
        fps: f64,
    ) -> Result<Self, VideoError> {
        let frames = buffers
            .iter()
            .enumerate()
            .map(|(i, bgr)| {
                let timestamp_ms = if fps > 0.0 { (i as f64 * 1000.0 / fps) as u64 } else { 0 };
                Frame::from_bgr(width, height, bgr, timestamp_ms, i as u64)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(path, frames, fps))
    }

    /// 用同一帧内容填充 `count` 帧
    pub fn uniform(path: impl Into<PathBuf>, count: u64, width: u32, height: u32, fill: u8) -> Self {
        let frames = (0..count)
            .map(|i| {
                Frame::new(
                    width,
                    height,
                    vec![fill; (width * height * 4) as usize],
                    (i as f64 * 1000.0 / DEFAULT_FPS) as u64,
                    i,
                )
            })
            .collect();
        Self::new(path, frames, DEFAULT_FPS)
    }

    /// 标记解码失败的帧（模拟损坏媒体）
    pub fn with_unreadable(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.unreadable.extend(indices);
        self
    }
}

impl FrameSource for MemoryClip {
    fn asset(&self) -> &VideoAsset {
        &self.asset
    }

    fn read_frame(&mut self, index: u64) -> Result<Frame, VideoError> {
        if self.unreadable.contains(&index) {
            return Err(VideoError::FrameReadError {
                path: self.asset.display_path(),
                index,
                reason: "corrupt frame".to_string(),
            });
        }
        let mut frame = self
            .frames
            .get(index as usize)
            .cloned()
            .ok_or_else(|| VideoError::FrameReadError {
                path: self.asset.display_path(),
                index,
                reason: "index out of range".to_string(),
            })?;
        frame.frame_number = index;
        Ok(frame)
    }
}

/// 按路径打开片段
pub trait ClipOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource + Send>, VideoError>;

    /// 类别目录下的条目是否是候选片段
    fn is_candidate(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSequenceOpener;

impl ClipOpener for ImageSequenceOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource + Send>, VideoError> {
        let sequence = ImageSequence::open(path)?;
        info!(
            "🎬 Clip opened: {} ({} frames)",
            sequence.asset.display_path(),
            sequence.asset.total_frames
        );
        Ok(Box::new(sequence))
    }

    fn is_candidate(&self, path: &Path) -> bool {
        path.is_dir()
    }
}
