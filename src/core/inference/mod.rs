//! 推理：分类器边界、判定引擎、视频流分析

pub mod analyzer;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod predictor;
pub mod taxonomy;

pub use analyzer::{Detection, VideoAnalysisReport, VideoStreamAnalyzer, DEFAULT_FRAME_SKIP};
pub use classifier::{Backend, Classifier, FrameBatch, ModelLoader, SimulatedClassifier};
pub use engine::{ClassScore, DecisionEngine, PredictionResult};
pub use error::InferenceError;
pub use predictor::FramePredictor;
pub use taxonomy::{ClassTaxonomy, Mode, ModeConfig, Severity, SeverityMap, NORMAL_CLASS};
