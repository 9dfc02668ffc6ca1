//! 分类器边界
//!
//! 网络结构与训练不在本库范围内，分类器只是一个能力：
//! 给定 (batch, N, H, W, 3) 的帧张量，返回每个样本在各类别上的概率。
//! 模型加载失败时退化为 `SimulatedClassifier`（演示模式），在构造时一次性选定。

use super::engine::{ClassScore, PredictionResult};
use super::error::InferenceError;
use super::taxonomy::{ModeConfig, NORMAL_CLASS};
use crate::core::video::FrameSample;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Mutex;

/// 同形状样本组成的批次
#[derive(Debug, Clone)]
pub struct FrameBatch {
    samples: Vec<FrameSample>,
}

impl FrameBatch {
    pub fn new(samples: Vec<FrameSample>) -> Result<Self, InferenceError> {
        if let Some(first) = samples.first() {
            let shape = first.shape();
            if let Some(bad) = samples.iter().position(|s| s.shape() != shape) {
                return Err(InferenceError::InvalidOutput(format!(
                    "batch item {} has shape {:?}, expected {:?}",
                    bad,
                    samples[bad].shape(),
                    shape
                )));
            }
        }
        Ok(Self { samples })
    }

    pub fn single(sample: FrameSample) -> Self {
        Self {
            samples: vec![sample],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// [batch, N, H, W, 3]
    pub fn shape(&self) -> [usize; 5] {
        let [n, h, w, c] = self.samples.first().map(|s| s.shape()).unwrap_or([0; 4]);
        [self.samples.len(), n, h, w, c]
    }

    pub fn samples(&self) -> &[FrameSample] {
        &self.samples
    }
}

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str {
        "classifier"
    }

    /// 每个批次样本返回一个与类别体系等长的概率向量
    fn predict(&self, batch: &FrameBatch) -> Result<Vec<Vec<f32>>, InferenceError>;
}

/// 从模型文件构建分类器（ONNX、NCNN 等实现在库外部提供）
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Classifier>, InferenceError>;
}

/// 推理后端：真实模型或演示模式
pub enum Backend {
    Real(Box<dyn Classifier>),
    Simulated(SimulatedClassifier),
}

impl Backend {
    /// 模型缺失或损坏都不会中断进程，而是退化到演示模式
    pub fn load(model_path: &Path, loader: &dyn ModelLoader) -> Self {
        if !model_path.exists() {
            warn!(
                "⚠️  No trained model found at {:?}. Using demo mode.",
                model_path
            );
            return Backend::Simulated(SimulatedClassifier::new());
        }

        match loader.load(model_path) {
            Ok(classifier) => {
                info!(
                    "✅ Model loaded from {:?} ({})",
                    model_path,
                    classifier.name()
                );
                Backend::Real(classifier)
            }
            Err(e) => {
                let e = match e {
                    InferenceError::ModelUnavailable(_) => e,
                    other => InferenceError::ModelUnavailable(other.to_string()),
                };
                warn!("⚠️  {}. Using demo mode with random predictions", e);
                Backend::Simulated(SimulatedClassifier::new())
            }
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Backend::Simulated(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Backend::Real(classifier) => classifier.name(),
            Backend::Simulated(_) => "simulated",
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Real(classifier) => write!(f, "Backend::Real({})", classifier.name()),
            Backend::Simulated(_) => f.write_str("Backend::Simulated"),
        }
    }
}

/// 演示模式：绝大多数时候输出高置信度的 normal，
/// 偶尔均匀随机输出一个异常类别，结果均带 `demo_mode = true`
pub struct SimulatedClassifier {
    rng: Mutex<StdRng>,
    abnormal_rate: f64,
}

impl SimulatedClassifier {
    pub const DEFAULT_ABNORMAL_RATE: f64 = 0.05;

    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            abnormal_rate: Self::DEFAULT_ABNORMAL_RATE,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            abnormal_rate: Self::DEFAULT_ABNORMAL_RATE,
        }
    }

    pub fn with_abnormal_rate(mut self, rate: f64) -> Self {
        self.abnormal_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn verdict(&self, config: &ModeConfig) -> PredictionResult {
        let abnormal: Vec<&str> = config.abnormal_classes().collect();
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let pick = if rng.gen::<f64>() < self.abnormal_rate {
            abnormal.choose(&mut *rng).copied()
        } else {
            None
        };

        let (action, confidence, is_abnormal) = match pick {
            Some(class) => (class.to_string(), rng.gen_range(0.7f32..0.95), true),
            None => (NORMAL_CLASS.to_string(), rng.gen_range(0.85f32..0.99), false),
        };

        let probabilities = config
            .taxonomy
            .classes()
            .iter()
            .map(|class| ClassScore {
                class: class.clone(),
                probability: if *class == action { confidence } else { 0.01 },
            })
            .collect();

        PredictionResult {
            severity: config.severity_for(&action),
            action,
            confidence,
            is_abnormal,
            threshold_used: config.mode.threshold(),
            probabilities,
            demo_mode: true,
        }
    }
}

impl Default for SimulatedClassifier {
    fn default() -> Self {
        Self::new()
    }
}
