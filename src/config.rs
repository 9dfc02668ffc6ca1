//! 流水线配置：所有字段可选，缺省值见各结构体的 `Default`
//!
//! ```json5
//! {
//!   preprocess: { raw_dir: "data/raw", seed: 7 },
//!   detector: {
//!     frame_skip: 15,
//!     mode: {
//!       mode: { kind: "open_world", confidence_threshold: 0.7 },
//!       taxonomy: ["fall", "fire", "theft"],
//!     },
//!   },
//! }
//! ```

use crate::core::dataset::{DatasetError, SplitRatios};
use crate::core::inference::{ModeConfig, DEFAULT_FRAME_SKIP};
use crate::core::video::SamplerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件读取失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置解析失败: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub sampler: SamplerConfig,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub seed: u64,
    /// 并行抽帧的线程数，None 时取 min(CPU 核数, 4)
    pub workers: Option<usize>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            sampler: SamplerConfig::default(),
            train_ratio: 0.7,
            val_ratio: 0.15,
            seed: 42,
            workers: None,
        }
    }
}

impl PreprocessConfig {
    pub fn ratios(&self) -> Result<SplitRatios, DatasetError> {
        SplitRatios::new(self.train_ratio, self.val_ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub mode: ModeConfig,
    pub frame_size: (u32, u32),
    pub frame_skip: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/action_classifier.onnx"),
            mode: ModeConfig::closed_world(),
            frame_size: (224, 224),
            frame_skip: DEFAULT_FRAME_SKIP,
        }
    }
}

impl DetectorConfig {
    /// 开集模型，阈值 0.6
    pub fn open_world() -> Self {
        Self {
            model_path: PathBuf::from("models/open_world_classifier.onnx"),
            mode: ModeConfig::open_world(ModeConfig::DEFAULT_THRESHOLD),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub detector: DetectorConfig,
}

impl PipelineConfig {
    pub fn from_json5_str(text: &str) -> Result<Self, ConfigError> {
        json5::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inference::{Mode, Severity};

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = PipelineConfig::from_json5_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.preprocess.sampler.frames_per_clip, 16);
        assert_eq!(config.preprocess.seed, 42);
        assert_eq!(config.detector.frame_skip, 30);
        assert!(matches!(config.detector.mode.mode, Mode::ClosedWorld));
    }

    #[test]
    fn test_partial_override() {
        let text = r#"{
            // 注释和尾逗号都允许
            preprocess: { raw_dir: "clips", seed: 7, sampler: { frames_per_clip: 8 }, },
            detector: {
                frame_skip: 15,
                mode: {
                    mode: { kind: "open_world", confidence_threshold: 0.75, gated_severity: "medium" },
                    taxonomy: ["fall", "fire"],
                },
            },
        }"#;
        let config = PipelineConfig::from_json5_str(text).unwrap();

        assert_eq!(config.preprocess.raw_dir, PathBuf::from("clips"));
        assert_eq!(config.preprocess.seed, 7);
        assert_eq!(config.preprocess.sampler.frames_per_clip, 8);
        assert_eq!(config.preprocess.sampler.frame_size, (224, 224));
        assert_eq!(config.preprocess.train_ratio, 0.7);

        let detector = &config.detector;
        assert_eq!(detector.frame_skip, 15);
        assert_eq!(detector.mode.taxonomy.len(), 2);
        assert_eq!(
            detector.mode.mode,
            Mode::OpenWorld {
                confidence_threshold: 0.75,
                gated_severity: Severity::Medium,
                unmapped_severity: Severity::Medium,
            }
        );
        assert!(detector.mode.validate().is_ok());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            PipelineConfig::from_json5_str("{ detector: { frame_skip: \"often\" } }"),
            Err(ConfigError::Parse(_))
        ));
        match PipelineConfig::from_json5_str(
            "{ detector: { mode: { mode: { kind: \"closed_world\" }, taxonomy: [] } } }",
        ) {
            Err(ConfigError::Parse(msg)) => assert!(msg.contains("at least one class"), "{}", msg),
            other => panic!("expected empty taxonomy rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pipeline.json5");
        std::fs::write(&path, "{ preprocess: { workers: 2 } }").unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.preprocess.workers, Some(2));
        assert!(matches!(
            PipelineConfig::from_file(&tmp.path().join("missing.json5")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_ratios_and_open_world_preset() {
        let mut config = PreprocessConfig::default();
        assert!(config.ratios().is_ok());
        config.val_ratio = 0.5;
        assert!(config.ratios().is_err());

        let detector = DetectorConfig::open_world();
        assert_eq!(detector.mode.mode.threshold(), Some(0.6));
        assert!(!detector.mode.taxonomy.has_normal());
    }
}
