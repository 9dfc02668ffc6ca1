//! 定长抽帧：每个片段均匀抽取 N 帧，缩放、RGB、归一化到 [0, 1]

use super::error::VideoError;
use super::source::FrameSource;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplerConfig {
    pub frames_per_clip: usize,
    /// (宽, 高)
    pub frame_size: (u32, u32),
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frames_per_clip: 16,
            frame_size: (224, 224),
        }
    }
}

impl SamplerConfig {
    /// 单帧推理用（视频流分析）
    pub fn single_frame(frame_size: (u32, u32)) -> Self {
        Self {
            frames_per_clip: 1,
            frame_size,
        }
    }

    pub fn validate(&self) -> Result<(), VideoError> {
        if self.frames_per_clip == 0 {
            return Err(VideoError::InvalidConfig(
                "frames_per_clip must be positive".to_string(),
            ));
        }
        if self.frame_size.0 == 0 || self.frame_size.1 == 0 {
            return Err(VideoError::InvalidConfig(format!(
                "frame_size must be non-zero, got {:?}",
                self.frame_size
            )));
        }
        Ok(())
    }
}

/// N 帧张量，形状 N x H x W x 3，f32 连续存储
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    frame_count: usize,
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl FrameSample {
    pub fn from_raw(
        frame_count: usize,
        width: u32,
        height: u32,
        data: Vec<f32>,
    ) -> Result<Self, VideoError> {
        let expected = [width as usize, height as usize, 3]
            .iter()
            .try_fold(frame_count, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                VideoError::InvalidFrame(format!(
                    "shape ({}, {}, {}, 3) overflows",
                    frame_count, height, width
                ))
            })?;
        if data.len() != expected {
            return Err(VideoError::InvalidFrame(format!(
                "tensor has {} values, expected {} for shape ({}, {}, {}, 3)",
                data.len(),
                expected,
                frame_count,
                height,
                width
            )));
        }
        Ok(Self {
            frame_count,
            width,
            height,
            data,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// [N, H, W, 3]
    pub fn shape(&self) -> [usize; 4] {
        [
            self.frame_count,
            self.height as usize,
            self.width as usize,
            3,
        ]
    }

    pub fn frame_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 3
    }

    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let len = self.frame_len();
        self.data.get(index * len..(index + 1) * len)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<f32> {
        self.data
    }
}

/// `count` 个在 [0, total-1] 上均匀分布的帧索引（线性插值后四舍五入）
pub fn sample_indices(total_frames: u64, count: usize) -> Vec<u64> {
    if count == 0 || total_frames == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }

    let last = (total_frames - 1) as f64;
    let step = last / (count - 1) as f64;
    (0..count)
        .map(|i| ((i as f64 * step).round() as u64).min(total_frames - 1))
        .collect()
}

pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Result<Self, VideoError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// 抽取定长帧序列。要么恰好 N 帧，要么失败，不会返回部分结果。
    pub fn sample(&self, source: &mut dyn FrameSource) -> Result<FrameSample, VideoError> {
        let asset = source.asset().clone();
        let required = self.config.frames_per_clip;

        if asset.total_frames < required as u64 {
            warn!(
                "⚠️  帧数不足 ({} < {}): {}",
                asset.total_frames,
                required,
                asset.display_path()
            );
            return Err(VideoError::InsufficientFrames {
                path: asset.display_path(),
                total_frames: asset.total_frames,
                required,
            });
        }

        let (width, height) = self.config.frame_size;
        let indices = sample_indices(asset.total_frames, required);
        let mut data = Vec::with_capacity(required * (width as usize) * (height as usize) * 3);

        for &index in &indices {
            let frame = source.read_frame(index).map_err(|e| {
                warn!("⚠️  帧读取失败 (idx: {}): {}", index, asset.display_path());
                match e {
                    VideoError::FrameReadError { .. } => e,
                    other => VideoError::FrameReadError {
                        path: asset.display_path(),
                        index,
                        reason: other.to_string(),
                    },
                }
            })?;
            frame.normalize_into(width, height, &mut data).map_err(|e| {
                VideoError::FrameReadError {
                    path: asset.display_path(),
                    index,
                    reason: e.to_string(),
                }
            })?;
        }

        debug!(
            "🎞️ Sampled {} frames from {} ({} total)",
            required,
            asset.display_path(),
            asset.total_frames
        );

        FrameSample::from_raw(required, width, height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::frame::Frame;
    use crate::core::video::source::MemoryClip;

    fn sampler(frames: usize, size: (u32, u32)) -> FrameSampler {
        FrameSampler::new(SamplerConfig {
            frames_per_clip: frames,
            frame_size: size,
        })
        .unwrap()
    }

    #[test]
    fn test_from_raw_rejects_overflowing_shape() {
        assert!(matches!(
            FrameSample::from_raw(usize::MAX, u32::MAX, u32::MAX, vec![]),
            Err(VideoError::InvalidFrame(_))
        ));
        assert!(FrameSample::from_raw(1, 2, 2, vec![0.0; 11]).is_err());
    }

    #[test]
    fn test_indices_span_full_range() {
        assert_eq!(sample_indices(100, 16).first(), Some(&0));
        assert_eq!(sample_indices(100, 16).last(), Some(&99));
        assert_eq!(sample_indices(16, 16), (0..16).collect::<Vec<u64>>());
        assert_eq!(sample_indices(5, 3), vec![0, 2, 4]);
        // 4 / 3 * i 四舍五入
        assert_eq!(sample_indices(5, 4), vec![0, 1, 3, 4]);
        assert_eq!(sample_indices(10, 1), vec![0]);
        assert!(sample_indices(10, 0).is_empty());
    }

    #[test]
    fn test_indices_are_non_decreasing() {
        for total in [16u64, 17, 31, 100, 301] {
            let indices = sample_indices(total, 16);
            assert_eq!(indices.len(), 16);
            assert!(indices.windows(2).all(|w| w[0] < w[1]));
            assert!(indices.iter().all(|&i| i < total));
        }
    }

    #[test]
    fn test_sample_exact_count_and_size() {
        let sampler = sampler(16, (32, 24));
        for total in [16u64, 20, 90] {
            let mut clip = MemoryClip::uniform("clip", total, 64, 48, 255);
            let sample = sampler.sample(&mut clip).unwrap();

            assert_eq!(sample.frame_count(), 16);
            assert_eq!(sample.shape(), [16, 24, 32, 3]);
            assert_eq!(sample.as_slice().len(), 16 * 24 * 32 * 3);
            assert!(sample.as_slice().iter().all(|v| (v - 1.0).abs() < 1e-6));
        }
    }

    #[test]
    fn test_short_clip_rejected() {
        let sampler = sampler(16, (8, 8));
        let mut clip = MemoryClip::uniform("short", 15, 8, 8, 0);

        match sampler.sample(&mut clip) {
            Err(VideoError::InsufficientFrames {
                total_frames,
                required,
                ..
            }) => {
                assert_eq!(total_frames, 15);
                assert_eq!(required, 16);
            }
            other => panic!("expected InsufficientFrames, got {:?}", other),
        }
    }

    #[test]
    fn test_single_bad_frame_fails_whole_sample() {
        let sampler = sampler(4, (8, 8));
        // 索引 [0, 3, 6, 9]
        let mut clip = MemoryClip::uniform("broken", 10, 8, 8, 0).with_unreadable([6]);

        assert!(matches!(
            sampler.sample(&mut clip),
            Err(VideoError::FrameReadError { index: 6, .. })
        ));

        // 未被抽中的坏帧不影响结果
        let mut clip = MemoryClip::uniform("broken", 10, 8, 8, 0).with_unreadable([5]);
        assert!(sampler.sample(&mut clip).is_ok());
    }

    /// 解码器返回的任意错误都归为该片段的 FrameReadError
    struct EofSource {
        inner: MemoryClip,
        fail_at: u64,
    }

    impl FrameSource for EofSource {
        fn asset(&self) -> &crate::core::video::source::VideoAsset {
            self.inner.asset()
        }

        fn read_frame(&mut self, index: u64) -> Result<Frame, VideoError> {
            if index == self.fail_at {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated").into());
            }
            self.inner.read_frame(index)
        }
    }

    #[test]
    fn test_decoder_io_error_becomes_frame_read_error() {
        let sampler = sampler(4, (2, 2));
        let mut source = EofSource {
            inner: MemoryClip::uniform("eof", 10, 2, 2, 0),
            fail_at: 3,
        };

        match sampler.sample(&mut source) {
            Err(e @ VideoError::FrameReadError { index: 3, .. }) => {
                assert!(e.is_clip_recoverable());
                assert!(e.to_string().contains("truncated"));
            }
            other => panic!("expected FrameReadError, got {:?}", other),
        }
    }

    #[test]
    fn test_sampled_frames_follow_indices() {
        let frames = (0..10u64)
            .map(|i| Frame::new(1, 1, vec![(i * 20) as u8, 0, 0, 255], 0, i))
            .collect();
        let mut clip = MemoryClip::new("ramp", frames, 30.0);

        let sample = sampler(4, (1, 1)).sample(&mut clip).unwrap();
        let reds: Vec<u8> = (0..4)
            .map(|i| (sample.frame(i).unwrap()[0] * 255.0).round() as u8)
            .collect();
        assert_eq!(reds, vec![0, 60, 120, 180]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(FrameSampler::new(SamplerConfig {
            frames_per_clip: 0,
            ..Default::default()
        })
        .is_err());
        assert!(FrameSampler::new(SamplerConfig {
            frames_per_clip: 4,
            frame_size: (0, 10),
        })
        .is_err());
    }

    #[test]
    fn test_frame_sample_shape_checked() {
        assert!(FrameSample::from_raw(2, 2, 2, vec![0.0; 24]).is_ok());
        assert!(FrameSample::from_raw(2, 2, 2, vec![0.0; 23]).is_err());
    }
}
