use super::classifier::{Backend, FrameBatch};
use super::engine::{DecisionEngine, PredictionResult};
use super::error::InferenceError;
use crate::core::video::{Frame, FrameSample, VideoError};
use log::debug;

/// 后端 + 判定引擎。演示模式与真实模型的分支只在这里出现一次。
pub struct FramePredictor {
    backend: Backend,
    engine: DecisionEngine,
    frame_size: (u32, u32),
}

impl FramePredictor {
    pub fn new(backend: Backend, engine: DecisionEngine, frame_size: (u32, u32)) -> Self {
        Self {
            backend,
            engine,
            frame_size,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_demo_mode(&self) -> bool {
        self.backend.is_simulated()
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// 单帧预处理：缩放、RGB、归一化，作为长度为 1 的帧序列
    pub fn preprocess(&self, frame: &Frame) -> Result<FrameSample, VideoError> {
        let (width, height) = self.frame_size;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        frame.normalize_into(width, height, &mut data)?;
        FrameSample::from_raw(1, width, height, data)
    }

    pub fn predict_frame(&self, frame: &Frame) -> Result<PredictionResult, InferenceError> {
        let sample = self.preprocess(frame)?;
        self.predict_sample(sample)
    }

    pub fn predict_sample(&self, sample: FrameSample) -> Result<PredictionResult, InferenceError> {
        let mut results = self.predict_batch(&FrameBatch::single(sample))?;
        results
            .pop()
            .ok_or_else(|| InferenceError::InvalidOutput("empty prediction batch".to_string()))
    }

    pub fn predict_batch(&self, batch: &FrameBatch) -> Result<Vec<PredictionResult>, InferenceError> {
        match &self.backend {
            Backend::Simulated(sim) => Ok((0..batch.len())
                .map(|_| sim.verdict(self.engine.config()))
                .collect()),
            Backend::Real(classifier) => {
                let outputs = classifier.predict(batch)?;
                if outputs.len() != batch.len() {
                    return Err(InferenceError::InvalidOutput(format!(
                        "classifier returned {} outputs for batch of {}",
                        outputs.len(),
                        batch.len()
                    )));
                }
                debug!("🧠 {} classified batch {:?}", classifier.name(), batch.shape());
                outputs
                    .iter()
                    .map(|probabilities| self.engine.decide(probabilities))
                    .collect()
            }
        }
    }
}
