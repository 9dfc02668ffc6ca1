//! 视频流分析：顺序解码，每隔 `frame_skip` 帧做一次判定，汇总异常检测

use super::engine::PredictionResult;
use super::error::InferenceError;
use super::predictor::FramePredictor;
use crate::core::video::{ClipOpener, FrameStream, SequentialReader, VideoError};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_FRAME_SKIP: u64 = 30;

/// 仅保留 `is_abnormal == true` 的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub prediction: PredictionResult,
    pub frame_number: u64,
    pub camera_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysisReport {
    pub camera_id: String,
    pub total_frames: u64,
    pub analyzed_frames: u64,
    /// 等于 `detections.len()`
    pub abnormal_detections: usize,
    /// 按帧号递增
    pub detections: Vec<Detection>,
    /// 任一判定来自演示模式
    pub demo_mode: bool,
}

pub struct VideoStreamAnalyzer<'a> {
    predictor: &'a FramePredictor,
    frame_skip: u64,
}

impl<'a> VideoStreamAnalyzer<'a> {
    pub fn new(predictor: &'a FramePredictor, frame_skip: u64) -> Result<Self, InferenceError> {
        if frame_skip == 0 {
            return Err(VideoError::InvalidConfig("frame_skip must be positive".to_string()).into());
        }
        Ok(Self {
            predictor,
            frame_skip,
        })
    }

    pub fn frame_skip(&self) -> u64 {
        self.frame_skip
    }

    /// 读到流结束为止。中途解码失败直接返回错误，不重试。
    pub fn analyze(
        &self,
        stream: &mut dyn FrameStream,
        camera_id: &str,
    ) -> Result<VideoAnalysisReport, InferenceError> {
        let mut total_frames = 0u64;
        let mut analyzed_frames = 0u64;
        let mut detections = Vec::new();
        let mut demo_mode = false;

        while let Some(frame) = stream.next_frame()? {
            let frame_number = total_frames;
            total_frames += 1;

            if frame_number % self.frame_skip != 0 {
                continue;
            }

            let prediction = self.predictor.predict_frame(&frame)?;
            analyzed_frames += 1;
            demo_mode |= prediction.demo_mode;

            if prediction.is_abnormal {
                debug!(
                    "🚨 [{}] frame {}: {} ({:.2}, {})",
                    camera_id,
                    frame_number,
                    prediction.action,
                    prediction.confidence,
                    prediction.severity
                );
                detections.push(Detection {
                    prediction,
                    frame_number,
                    camera_id: camera_id.to_string(),
                });
            }
        }

        info!(
            "📊 [{}] analyzed {}/{} frames, {} abnormal detections{}",
            camera_id,
            analyzed_frames,
            total_frames,
            detections.len(),
            if demo_mode { " (demo mode)" } else { "" }
        );

        Ok(VideoAnalysisReport {
            camera_id: camera_id.to_string(),
            total_frames,
            analyzed_frames,
            abnormal_detections: detections.len(),
            detections,
            demo_mode,
        })
    }

    /// 打开失败时在产生任何报告之前返回 `StreamUnavailable`
    pub fn analyze_path(
        &self,
        opener: &dyn ClipOpener,
        path: &Path,
        camera_id: &str,
    ) -> Result<VideoAnalysisReport, InferenceError> {
        let source = opener.open(path).map_err(|e| match e {
            VideoError::StreamUnavailable { .. } => e,
            other => VideoError::StreamUnavailable {
                path: path.display().to_string(),
                reason: other.to_string(),
            },
        })?;
        let mut reader = SequentialReader::new(source);
        self.analyze(&mut reader, camera_id)
    }

    /// 多个视频并发分析，每个视频独占一个句柄；结果与输入顺序一致
    pub fn analyze_many(
        &self,
        opener: &dyn ClipOpener,
        jobs: &[(PathBuf, String)],
    ) -> Vec<Result<VideoAnalysisReport, InferenceError>> {
        jobs.par_iter()
            .map(|(path, camera_id)| {
                self.analyze_path(opener, path, camera_id).map_err(|e| {
                    warn!("⚠️  [{}] analysis failed: {}", camera_id, e);
                    e
                })
            })
            .collect()
    }
}
