//! 类别体系、严重程度映射与两种判定模式
//!
//! 闭集模式（ClosedWorld）的类别里包含 `normal`；开集模式（OpenWorld）
//! 只训练了异常类别，`normal` 由置信度阈值推断。两者是同一个
//! `ModeConfig` 的两个实例。

use super::error::InferenceError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const NORMAL_CLASS: &str = "normal";

/// 异常行为类别（不含 normal），顺序即开集模型的输出顺序
pub const ABNORMAL_CLASSES: [&str; 8] = [
    "fall",
    "vandalism",
    "fire",
    "smoking",
    "abandonment",
    "theft",
    "assault",
    "vulnerable",
];

static DEFAULT_SEVERITIES: Lazy<HashMap<String, Severity>> = Lazy::new(|| {
    [
        (NORMAL_CLASS, Severity::Low),
        ("fall", Severity::High),
        ("vandalism", Severity::High),
        ("fire", Severity::Critical),
        ("smoking", Severity::Medium),
        ("abandonment", Severity::Medium),
        ("theft", Severity::High),
        ("assault", Severity::Critical),
        ("vulnerable", Severity::Medium),
    ]
    .into_iter()
    .map(|(class, severity)| (class.to_string(), severity))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// 有序、非空、无重复的类别列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ClassTaxonomy {
    classes: Vec<String>,
}

impl ClassTaxonomy {
    pub fn new<I, S>(classes: I) -> Result<Self, InferenceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return Err(InferenceError::InvalidTaxonomy(
                "taxonomy must contain at least one class".to_string(),
            ));
        }
        for (i, class) in classes.iter().enumerate() {
            if class.trim().is_empty() {
                return Err(InferenceError::InvalidTaxonomy(format!(
                    "class #{} has an empty name",
                    i
                )));
            }
            if classes[..i].contains(class) {
                return Err(InferenceError::InvalidTaxonomy(format!(
                    "duplicate class '{}'",
                    class
                )));
            }
        }
        Ok(Self { classes })
    }

    /// 9 类：normal + 8 种异常行为
    pub fn closed_world() -> Self {
        let classes = std::iter::once(NORMAL_CLASS)
            .chain(ABNORMAL_CLASSES)
            .map(String::from)
            .collect();
        Self { classes }
    }

    /// 8 类：仅异常行为
    pub fn open_world() -> Self {
        Self {
            classes: ABNORMAL_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn index_of(&self, class: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.index_of(class).is_some()
    }

    pub fn has_normal(&self) -> bool {
        self.contains(NORMAL_CLASS)
    }
}

impl TryFrom<Vec<String>> for ClassTaxonomy {
    type Error = InferenceError;

    fn try_from(classes: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(classes)
    }
}

impl From<ClassTaxonomy> for Vec<String> {
    fn from(taxonomy: ClassTaxonomy) -> Self {
        taxonomy.classes
    }
}

/// 类别 -> 严重程度；未映射的类别使用 `fallback`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityMap {
    #[serde(default)]
    levels: HashMap<String, Severity>,
    #[serde(default)]
    fallback: Severity,
}

impl Default for SeverityMap {
    fn default() -> Self {
        Self {
            levels: DEFAULT_SEVERITIES.clone(),
            fallback: Severity::Low,
        }
    }
}

impl SeverityMap {
    pub fn new(levels: HashMap<String, Severity>, fallback: Severity) -> Self {
        Self { levels, fallback }
    }

    pub fn get(&self, class: &str) -> Severity {
        self.levels.get(class).copied().unwrap_or(self.fallback)
    }

    pub fn insert(&mut self, class: impl Into<String>, severity: Severity) {
        self.levels.insert(class.into(), severity);
    }

    pub fn fallback(&self) -> Severity {
        self.fallback
    }

    pub fn is_mapped(&self, class: &str) -> bool {
        self.levels.contains_key(class)
    }
}

/// 判定模式
///
/// 开集模式下 `confidence_threshold` 是最重要的可调参数：阈值调高，
/// 边缘置信度的异常被判为 normal，误报减少但漏报增加；调低则相反。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mode {
    ClosedWorld,
    OpenWorld {
        confidence_threshold: f32,
        /// 低于阈值被判为 normal 时使用的严重程度（不继承原始最高类别）
        #[serde(default)]
        gated_severity: Severity,
        /// 高于阈值、但严重程度表里没有的类别
        #[serde(default = "default_open_world_unmapped")]
        unmapped_severity: Severity,
    },
}

fn default_open_world_unmapped() -> Severity {
    Severity::Medium
}

impl Mode {
    pub fn threshold(&self) -> Option<f32> {
        match self {
            Mode::ClosedWorld => None,
            Mode::OpenWorld {
                confidence_threshold,
                ..
            } => Some(*confidence_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub mode: Mode,
    pub taxonomy: ClassTaxonomy,
    #[serde(default)]
    pub severity_map: SeverityMap,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self::closed_world()
    }
}

impl ModeConfig {
    pub const DEFAULT_THRESHOLD: f32 = 0.6;

    pub fn closed_world() -> Self {
        Self {
            mode: Mode::ClosedWorld,
            taxonomy: ClassTaxonomy::closed_world(),
            severity_map: SeverityMap::default(),
        }
    }

    pub fn open_world(confidence_threshold: f32) -> Self {
        Self {
            mode: Mode::OpenWorld {
                confidence_threshold,
                gated_severity: Severity::Low,
                unmapped_severity: default_open_world_unmapped(),
            },
            taxonomy: ClassTaxonomy::open_world(),
            severity_map: SeverityMap::default(),
        }
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        match self.mode {
            Mode::ClosedWorld => {
                if !self.taxonomy.has_normal() {
                    return Err(InferenceError::InvalidTaxonomy(
                        "closed-world taxonomy must include 'normal'".to_string(),
                    ));
                }
            }
            Mode::OpenWorld {
                confidence_threshold,
                ..
            } => {
                if self.taxonomy.has_normal() {
                    return Err(InferenceError::InvalidTaxonomy(
                        "open-world taxonomy must not include 'normal'".to_string(),
                    ));
                }
                if !(0.0..=1.0).contains(&confidence_threshold) {
                    return Err(InferenceError::InvalidTaxonomy(format!(
                        "confidence_threshold must be within [0, 1], got {}",
                        confidence_threshold
                    )));
                }
            }
        }
        Ok(())
    }

    /// 闭集模式下未映射类别取表的 fallback，开集模式取 `unmapped_severity`
    pub fn severity_for(&self, class: &str) -> Severity {
        match self.mode {
            Mode::OpenWorld {
                unmapped_severity, ..
            } if !self.severity_map.is_mapped(class) => unmapped_severity,
            _ => self.severity_map.get(class),
        }
    }

    pub fn abnormal_classes(&self) -> impl Iterator<Item = &str> {
        self.taxonomy
            .classes()
            .iter()
            .map(String::as_str)
            .filter(|c| *c != NORMAL_CLASS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let closed = ModeConfig::closed_world();
        assert_eq!(closed.taxonomy.len(), 9);
        assert_eq!(closed.taxonomy.index_of(NORMAL_CLASS), Some(0));
        assert!(closed.validate().is_ok());

        let open = ModeConfig::open_world(0.6);
        assert_eq!(open.taxonomy.len(), 8);
        assert!(!open.taxonomy.has_normal());
        assert_eq!(open.mode.threshold(), Some(0.6));
        assert!(open.validate().is_ok());
        assert_eq!(open.abnormal_classes().count(), 8);
        assert_eq!(closed.abnormal_classes().count(), 8);
    }

    #[test]
    fn test_taxonomy_rejects_bad_lists() {
        assert!(ClassTaxonomy::new(Vec::<String>::new()).is_err());
        assert!(ClassTaxonomy::new(["fall", "fall"]).is_err());
        assert!(ClassTaxonomy::new(["fall", " "]).is_err());
        assert!(ClassTaxonomy::new(["fall", "fire"]).is_ok());
    }

    #[test]
    fn test_severity_map_covers_every_class() {
        let map = SeverityMap::default();
        for class in ClassTaxonomy::closed_world().classes() {
            assert!(map.is_mapped(class), "{} unmapped", class);
        }
        assert_eq!(map.get("fire"), Severity::Critical);
        assert_eq!(map.get("smoking"), Severity::Medium);
        assert_eq!(map.get("unknown_class"), Severity::Low);
    }

    #[test]
    fn test_unmapped_severity_depends_on_mode() {
        let closed = ModeConfig::closed_world();
        assert_eq!(closed.severity_for("loitering"), Severity::Low);
        assert_eq!(closed.severity_for("fire"), Severity::Critical);

        let open = ModeConfig::open_world(0.6);
        assert_eq!(open.severity_for("loitering"), Severity::Medium);
        assert_eq!(open.severity_for("fire"), Severity::Critical);
        assert_eq!(open.severity_for("smoking"), Severity::Medium);
        assert_eq!(open.severity_for("theft"), Severity::High);
    }

    #[test]
    fn test_mode_validation() {
        let mut bad = ModeConfig::open_world(1.5);
        assert!(bad.validate().is_err());

        bad = ModeConfig::open_world(0.5);
        bad.taxonomy = ClassTaxonomy::closed_world();
        assert!(bad.validate().is_err());

        let mut closed = ModeConfig::closed_world();
        closed.taxonomy = ClassTaxonomy::open_world();
        assert!(closed.validate().is_err());
    }

    #[test]
    fn test_mode_config_serde() {
        let json = r#"{
            "mode": {"kind": "open_world", "confidence_threshold": 0.7},
            "taxonomy": ["fire", "theft"]
        }"#;
        let config: ModeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.mode,
            Mode::OpenWorld {
                confidence_threshold: 0.7,
                gated_severity: Severity::Low,
                unmapped_severity: Severity::Medium,
            }
        );
        assert_eq!(config.taxonomy.len(), 2);
        assert_eq!(config.severity_map.get("theft"), Severity::High);

        let dup = r#"{"mode": {"kind": "closed_world"}, "taxonomy": ["normal", "normal"]}"#;
        assert!(serde_json::from_str::<ModeConfig>(dup).is_err());
    }

    #[test]
    fn test_severity_display_and_order() {
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert!(Severity::Critical > Severity::High);
        assert_eq!(serde_json::to_string(&Severity::Medium).unwrap(), "\"medium\"");
    }
}
