//! 推理判定引擎：把分类器输出的类别概率转换为 (action, is_abnormal, severity)

use super::error::InferenceError;
use super::taxonomy::{Mode, ModeConfig, Severity, NORMAL_CLASS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub class: String,
    pub probability: f32,
}

/// 单次判定结果，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub action: String,
    pub confidence: f32,
    pub is_abnormal: bool,
    pub severity: Severity,
    /// 开集模式下使用的阈值
    pub threshold_used: Option<f32>,
    /// 按类别体系顺序
    pub probabilities: Vec<ClassScore>,
    /// 演示模式（无模型）下的模拟结果，不可当作真实检测
    pub demo_mode: bool,
}

impl PredictionResult {
    pub fn probability(&self, class: &str) -> Option<f32> {
        self.probabilities
            .iter()
            .find(|s| s.class == class)
            .map(|s| s.probability)
    }
}

/// 纯函数式判定，配置不可变，可在多个 worker 间共享
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: ModeConfig,
}

impl DecisionEngine {
    pub fn new(config: ModeConfig) -> Result<Self, InferenceError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    /// `probabilities` 与类别体系按下标对齐
    pub fn decide(&self, probabilities: &[f32]) -> Result<PredictionResult, InferenceError> {
        let taxonomy = &self.config.taxonomy;
        if probabilities.len() != taxonomy.len() {
            return Err(InferenceError::InvalidOutput(format!(
                "expected {} class probabilities, got {}",
                taxonomy.len(),
                probabilities.len()
            )));
        }
        if let Some((i, p)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p < 0.0 || **p > 1.0)
        {
            return Err(InferenceError::InvalidOutput(format!(
                "probability for '{}' out of range: {}",
                taxonomy.name(i).unwrap_or("?"),
                p
            )));
        }

        let (top_index, confidence) = argmax(probabilities);
        let candidate = taxonomy.name(top_index).unwrap_or(NORMAL_CLASS).to_string();

        let scores = taxonomy
            .classes()
            .iter()
            .zip(probabilities)
            .map(|(class, &probability)| ClassScore {
                class: class.clone(),
                probability,
            })
            .collect();

        let (action, is_abnormal, severity) = match self.config.mode {
            Mode::ClosedWorld => {
                let is_abnormal = candidate != NORMAL_CLASS;
                let severity = self.config.severity_for(&candidate);
                (candidate, is_abnormal, severity)
            }
            Mode::OpenWorld {
                confidence_threshold,
                gated_severity,
                ..
            } => {
                if confidence < confidence_threshold {
                    // 置信度不足：无论原始最高类别是什么都判为 normal
                    (NORMAL_CLASS.to_string(), false, gated_severity)
                } else {
                    let severity = self.config.severity_for(&candidate);
                    (candidate, true, severity)
                }
            }
        };

        Ok(PredictionResult {
            action,
            confidence,
            is_abnormal,
            severity,
            threshold_used: self.config.mode.threshold(),
            probabilities: scores,
            demo_mode: false,
        })
    }

    /// 以类别名映射给出的概率；缺失类别视为输出不完整
    pub fn decide_map(
        &self,
        probabilities: &HashMap<String, f32>,
    ) -> Result<PredictionResult, InferenceError> {
        let ordered = self
            .config
            .taxonomy
            .classes()
            .iter()
            .map(|class| {
                probabilities.get(class).copied().ok_or_else(|| {
                    InferenceError::InvalidOutput(format!("missing probability for '{}'", class))
                })
            })
            .collect::<Result<Vec<f32>, _>>()?;
        self.decide(&ordered)
    }
}

/// 并列最大值取下标最小者
fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = (0, values.first().copied().unwrap_or(0.0));
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}
