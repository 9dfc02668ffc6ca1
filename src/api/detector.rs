//! 异常行为检测器

use crate::config::DetectorConfig;
use crate::core::inference::{
    Backend, DecisionEngine, FramePredictor, InferenceError, ModeConfig, ModelLoader,
    PredictionResult, VideoAnalysisReport, VideoStreamAnalyzer,
};
use crate::core::video::{
    ClipOpener, Frame, FrameSample, FrameStream, ImageSequenceOpener, MemoryClip, RawFrame,
    SequentialReader, VideoError,
};
use log::{error, info};
use std::path::{Path, PathBuf};

/// 异常行为检测器 - 模型加载 + 单帧判定 + 视频流分析
///
/// ```ignore
/// let detector = AbnormalDetector::create(DetectorConfig::default(), &loader)?;
/// let report = detector.analyze_video(Path::new("clips/cam_01"), "camera_1")?;
/// ```
pub struct AbnormalDetector {
    predictor: FramePredictor,
    opener: Box<dyn ClipOpener>,
    frame_skip: u64,
}

impl AbnormalDetector {
    /// 创建检测器并加载模型；模型缺失或加载失败时进入演示模式
    pub fn create(config: DetectorConfig, loader: &dyn ModelLoader) -> Result<Self, InferenceError> {
        crate::init_logging();
        info!(
            "🎬 AbnormalDetector: initializing with model_path: {:?}",
            config.model_path
        );

        let engine = DecisionEngine::new(config.mode)?;
        let backend = Backend::load(&config.model_path, loader);
        Self::assemble(engine, backend, config.frame_size, config.frame_skip)
    }

    /// 使用已构建好的后端（例如宿主侧已加载的模型）
    pub fn with_backend(config: DetectorConfig, backend: Backend) -> Result<Self, InferenceError> {
        let engine = DecisionEngine::new(config.mode)?;
        Self::assemble(engine, backend, config.frame_size, config.frame_skip)
    }

    fn assemble(
        engine: DecisionEngine,
        backend: Backend,
        frame_size: (u32, u32),
        frame_skip: u64,
    ) -> Result<Self, InferenceError> {
        if frame_size.0 == 0 || frame_size.1 == 0 {
            return Err(VideoError::InvalidConfig(format!(
                "frame_size must be positive, got {:?}",
                frame_size
            ))
            .into());
        }
        if frame_skip == 0 {
            return Err(VideoError::InvalidConfig("frame_skip must be positive".to_string()).into());
        }

        let predictor = FramePredictor::new(backend, engine, frame_size);
        info!(
            "✅ AbnormalDetector ready (backend: {}, classes: {}, frame_skip: {}{})",
            predictor.backend().name(),
            predictor.engine().config().taxonomy.len(),
            frame_skip,
            if predictor.is_demo_mode() { ", demo mode" } else { "" }
        );
        Ok(Self {
            predictor,
            opener: Box::new(ImageSequenceOpener),
            frame_skip,
        })
    }

    /// 替换视频打开方式（默认按图片序列目录读取）
    pub fn with_opener(mut self, opener: Box<dyn ClipOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn is_demo_mode(&self) -> bool {
        self.predictor.is_demo_mode()
    }

    pub fn mode(&self) -> &ModeConfig {
        self.predictor.engine().config()
    }

    pub fn frame_skip(&self) -> u64 {
        self.frame_skip
    }

    /// 单帧判定
    pub fn predict_frame(&self, frame: &Frame) -> Result<PredictionResult, InferenceError> {
        self.predictor.predict_frame(frame)
    }

    /// 已抽好的帧序列判定
    pub fn predict_clip(&self, sample: FrameSample) -> Result<PredictionResult, InferenceError> {
        self.predictor.predict_sample(sample)
    }

    /// 分析视频文件
    pub fn analyze_video(
        &self,
        path: &Path,
        camera_id: &str,
    ) -> Result<VideoAnalysisReport, InferenceError> {
        info!("🎥 Analyzing {:?} (camera: {})", path, camera_id);
        let analyzer = VideoStreamAnalyzer::new(&self.predictor, self.frame_skip)?;
        analyzer
            .analyze_path(self.opener.as_ref(), path, camera_id)
            .map_err(|e| {
                error!("❌ Analysis of {:?} failed: {}", path, e);
                e
            })
    }

    /// 分析宿主侧已打开的帧流
    pub fn analyze_stream(
        &self,
        stream: &mut dyn FrameStream,
        camera_id: &str,
    ) -> Result<VideoAnalysisReport, InferenceError> {
        VideoStreamAnalyzer::new(&self.predictor, self.frame_skip)?.analyze(stream, camera_id)
    }

    /// 分析原生解码器交来的 YUV420 帧
    pub fn analyze_raw_frames(
        &self,
        frames: Vec<RawFrame>,
        fps: f64,
        camera_id: &str,
    ) -> Result<VideoAnalysisReport, InferenceError> {
        let clip = MemoryClip::from_raw_frames(camera_id, frames, fps)?;
        self.analyze_stream(&mut SequentialReader::new(clip), camera_id)
    }

    /// 分析原生解码器交来的 BGR 帧
    pub fn analyze_bgr_frames(
        &self,
        width: u32,
        height: u32,
        buffers: Vec<Vec<u8>>,
        fps: f64,
        camera_id: &str,
    ) -> Result<VideoAnalysisReport, InferenceError> {
        let clip = MemoryClip::from_bgr_frames(camera_id, width, height, buffers, fps)?;
        self.analyze_stream(&mut SequentialReader::new(clip), camera_id)
    }

    /// 并发分析多路视频，结果顺序与输入一致
    pub fn analyze_many(
        &self,
        jobs: &[(PathBuf, String)],
    ) -> Result<Vec<Result<VideoAnalysisReport, InferenceError>>, InferenceError> {
        let analyzer = VideoStreamAnalyzer::new(&self.predictor, self.frame_skip)?;
        Ok(analyzer.analyze_many(self.opener.as_ref(), jobs))
    }
}

impl Drop for AbnormalDetector {
    fn drop(&mut self) {
        info!("🗑️ AbnormalDetector: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inference::classifier::test_support::{
        FixedClassifier, RedFlagClassifier, StubLoader,
    };
    use crate::core::inference::Severity;
    use crate::core::video::source::test_support::write_png_clip;

    fn fire_classifier() -> Backend {
        let mut probabilities = vec![0.01f32; 9];
        probabilities[3] = 0.9; // fire
        Backend::Real(Box::new(FixedClassifier { probabilities }))
    }

    fn small_config() -> DetectorConfig {
        DetectorConfig {
            frame_size: (4, 4),
            frame_skip: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_model_falls_back_to_demo_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let config = DetectorConfig {
            model_path: tmp.path().join("absent.onnx"),
            ..small_config()
        };
        let detector = AbnormalDetector::create(config, &StubLoader { fail: false }).unwrap();
        assert!(detector.is_demo_mode());

        let frame = Frame::new(8, 8, vec![0; 8 * 8 * 4], 0, 0);
        let result = detector.predict_frame(&frame).unwrap();
        assert!(result.demo_mode);
    }

    #[test]
    fn test_corrupt_model_falls_back_to_demo_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let model_path = tmp.path().join("model.onnx");
        std::fs::write(&model_path, b"garbage").unwrap();

        let config = DetectorConfig {
            model_path,
            ..small_config()
        };
        let detector = AbnormalDetector::create(config, &StubLoader { fail: true }).unwrap();
        assert!(detector.is_demo_mode());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let zero_skip = DetectorConfig {
            frame_skip: 0,
            ..small_config()
        };
        assert!(AbnormalDetector::with_backend(zero_skip, fire_classifier()).is_err());

        let zero_size = DetectorConfig {
            frame_size: (0, 4),
            ..small_config()
        };
        assert!(AbnormalDetector::with_backend(zero_size, fire_classifier()).is_err());

        let mut mismatched = small_config();
        mismatched.mode.taxonomy = crate::core::inference::ClassTaxonomy::open_world();
        assert!(matches!(
            AbnormalDetector::with_backend(mismatched, fire_classifier()),
            Err(InferenceError::InvalidTaxonomy(_))
        ));
    }

    #[test]
    fn test_analyze_video_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_png_clip(&tmp.path().join("cam"), 12, 6, 6);

        let detector = AbnormalDetector::with_backend(small_config(), fire_classifier()).unwrap();
        assert!(!detector.is_demo_mode());

        let report = detector.analyze_video(&tmp.path().join("cam"), "camera_9").unwrap();
        assert_eq!(report.total_frames, 12);
        assert_eq!(report.analyzed_frames, 3);
        assert_eq!(report.abnormal_detections, 3);
        let numbers: Vec<u64> = report.detections.iter().map(|d| d.frame_number).collect();
        assert_eq!(numbers, vec![0, 5, 10]);
        assert!(report
            .detections
            .iter()
            .all(|d| d.prediction.action == "fire" && d.prediction.severity == Severity::Critical));
    }

    #[test]
    fn test_analyze_stream_and_many() {
        let detector = AbnormalDetector::with_backend(small_config(), fire_classifier()).unwrap();

        let mut stream = SequentialReader::new(MemoryClip::uniform("mem", 7, 4, 4, 10));
        let report = detector.analyze_stream(&mut stream, "cam").unwrap();
        assert_eq!(report.analyzed_frames, 2);

        let tmp = tempfile::tempdir().unwrap();
        write_png_clip(&tmp.path().join("a"), 5, 4, 4);
        let jobs = vec![
            (tmp.path().join("a"), "a".to_string()),
            (tmp.path().join("nope"), "b".to_string()),
        ];
        let results = detector.analyze_many(&jobs).unwrap();
        assert_eq!(results[0].as_ref().unwrap().analyzed_frames, 1);
        assert!(matches!(
            results[1],
            Err(InferenceError::Video(VideoError::StreamUnavailable { .. }))
        ));
    }

    #[test]
    fn test_predict_clip() {
        let detector = AbnormalDetector::with_backend(small_config(), fire_classifier()).unwrap();
        let sample = FrameSample::from_raw(16, 4, 4, vec![0.2; 16 * 4 * 4 * 3]).unwrap();
        let result = detector.predict_clip(sample).unwrap();
        assert_eq!(result.action, "fire");
        assert!(result.is_abnormal);
        assert_eq!(detector.mode().taxonomy.len(), 9);
    }

    #[test]
    fn test_bgr_frames_reach_model_as_rgb() {
        let mut normal = vec![0.01f32; 9];
        normal[0] = 0.9;
        let mut abnormal = vec![0.01f32; 9];
        abnormal[1] = 0.9; // fall
        let backend = Backend::Real(Box::new(RedFlagClassifier { normal, abnormal }));
        let config = DetectorConfig {
            frame_skip: 1,
            ..small_config()
        };
        let detector = AbnormalDetector::with_backend(config, backend).unwrap();

        // 纯蓝帧，然后纯红帧
        let blue = [255u8, 0, 0].repeat(16);
        let red = [0u8, 0, 255].repeat(16);
        let report = detector
            .analyze_bgr_frames(4, 4, vec![blue, red], 25.0, "native_cam")
            .unwrap();

        assert_eq!(report.analyzed_frames, 2);
        assert_eq!(report.abnormal_detections, 1);
        assert_eq!(report.detections[0].frame_number, 1);
        assert_eq!(report.detections[0].prediction.action, "fall");

        assert!(detector
            .analyze_bgr_frames(4, 4, vec![vec![0; 7]], 25.0, "native_cam")
            .is_err());
    }

    #[test]
    fn test_analyze_raw_frames() {
        let detector = AbnormalDetector::with_backend(small_config(), fire_classifier()).unwrap();
        let frames = (0..6)
            .map(|i| RawFrame {
                width: 4,
                height: 4,
                y_plane: vec![90; 16],
                u_plane: vec![128; 4],
                v_plane: vec![128; 4],
                timestamp_ms: i * 40,
                frame_number: i,
            })
            .collect();

        let report = detector.analyze_raw_frames(frames, 25.0, "yuv_cam").unwrap();
        assert_eq!(report.total_frames, 6);
        assert_eq!(report.analyzed_frames, 2);
        assert_eq!(report.abnormal_detections, 2);
    }
}
