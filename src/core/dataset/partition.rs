//! 两阶段随机划分：先切出 train，再把剩余部分切成 val / test，两次都使用同一个种子

use super::corpus::LabeledClip;
use super::error::DatasetError;
use crate::core::inference::ClassTaxonomy;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Train,
    Val,
    Test,
}

impl SplitKind {
    pub const ALL: [SplitKind; 3] = [SplitKind::Train, SplitKind::Val, SplitKind::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitKind::Train => "train",
            SplitKind::Val => "val",
            SplitKind::Test => "test",
        }
    }
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64) -> Result<Self, DatasetError> {
        let ratios = Self { train, val };
        ratios.validate()?;
        Ok(ratios)
    }

    pub fn test(&self) -> f64 {
        (1.0 - self.train - self.val).max(0.0)
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        let in_unit = |r: f64| r.is_finite() && (0.0..=1.0).contains(&r);
        if !in_unit(self.train) || !in_unit(self.val) {
            return Err(DatasetError::InvalidRatios(format!(
                "ratios must be within [0, 1]: train={}, val={}",
                self.train, self.val
            )));
        }
        if self.train + self.val > 1.0 + 1e-9 {
            return Err(DatasetError::InvalidRatios(format!(
                "train + val must not exceed 1: {} + {}",
                self.train, self.val
            )));
        }
        Ok(())
    }

    /// 第二阶段中 val 在剩余部分里的占比
    fn val_fraction_of_remainder(&self) -> f64 {
        let rest = self.val + self.test();
        if rest <= 0.0 {
            1.0
        } else {
            self.val / rest
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub kind: SplitKind,
    pub clips: Vec<LabeledClip>,
}

impl DatasetSplit {
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// 每个类别的样本数，类别体系中的类别即使为 0 也列出
    pub fn class_counts(&self, taxonomy: &ClassTaxonomy) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = taxonomy
            .classes()
            .iter()
            .map(|c| (c.clone(), 0))
            .collect();
        for clip in &self.clips {
            *counts.entry(clip.label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub train: DatasetSplit,
    pub val: DatasetSplit,
    pub test: DatasetSplit,
}

impl Partition {
    pub fn splits(&self) -> [&DatasetSplit; 3] {
        [&self.train, &self.val, &self.test]
    }

    pub fn split(&self, kind: SplitKind) -> &DatasetSplit {
        match kind {
            SplitKind::Train => &self.train,
            SplitKind::Val => &self.val,
            SplitKind::Test => &self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }
}

/// 打乱后取前 round(fraction * len) 个
fn split_off<T>(mut items: Vec<T>, fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    let first_len = ((fraction * items.len() as f64).round() as usize).min(items.len());
    let rest = items.split_off(first_len);
    (items, rest)
}

/// 给定 (语料顺序, 比例, 种子) 结果确定；三个子集互不相交且并集为整个语料
pub fn partition(
    corpus: Vec<LabeledClip>,
    ratios: SplitRatios,
    seed: u64,
) -> Result<Partition, DatasetError> {
    if corpus.is_empty() {
        return Err(DatasetError::EmptyCorpus);
    }
    ratios.validate()?;

    let total = corpus.len();
    let (train, remainder) = split_off(corpus, ratios.train, seed);
    let (val, test) = split_off(remainder, ratios.val_fraction_of_remainder(), seed);

    info!(
        "🔀 Split {} clips (train: {:.0}%, val: {:.0}%, test: {:.0}%) -> {}/{}/{}",
        total,
        ratios.train * 100.0,
        ratios.val * 100.0,
        ratios.test() * 100.0,
        train.len(),
        val.len(),
        test.len()
    );

    Ok(Partition {
        train: DatasetSplit {
            kind: SplitKind::Train,
            clips: train,
        },
        val: DatasetSplit {
            kind: SplitKind::Val,
            clips: val,
        },
        test: DatasetSplit {
            kind: SplitKind::Test,
            clips: test,
        },
    })
}
