//! 划分结果落盘与回读
//!
//! 目录布局：`{processed}/{split}/{class}/{class}_{index:05}.npy`，
//! 统计文件：`{processed}/dataset_stats.json`。

use super::error::DatasetError;
use super::npy::{read_npy, write_npy};
use super::partition::{Partition, SplitKind};
use crate::core::inference::ClassTaxonomy;
use crate::core::video::FrameSample;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATS_FILE: &str = "dataset_stats.json";
pub const SAMPLE_EXTENSION: &str = "npy";

pub fn sample_path(processed_dir: &Path, split: SplitKind, class: &str, index: usize) -> PathBuf {
    processed_dir
        .join(split.as_str())
        .join(class)
        .join(format!("{}_{:05}.{}", class, index, SAMPLE_EXTENSION))
}

/// stats[split][class] = count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    #[serde(default)]
    pub train: BTreeMap<String, usize>,
    #[serde(default)]
    pub val: BTreeMap<String, usize>,
    #[serde(default)]
    pub test: BTreeMap<String, usize>,
}

impl DatasetStats {
    pub fn with_classes(taxonomy: &ClassTaxonomy) -> Self {
        let zeros: BTreeMap<String, usize> = taxonomy
            .classes()
            .iter()
            .map(|c| (c.clone(), 0))
            .collect();
        Self {
            train: zeros.clone(),
            val: zeros.clone(),
            test: zeros,
        }
    }

    pub fn split(&self, kind: SplitKind) -> &BTreeMap<String, usize> {
        match kind {
            SplitKind::Train => &self.train,
            SplitKind::Val => &self.val,
            SplitKind::Test => &self.test,
        }
    }

    fn split_mut(&mut self, kind: SplitKind) -> &mut BTreeMap<String, usize> {
        match kind {
            SplitKind::Train => &mut self.train,
            SplitKind::Val => &mut self.val,
            SplitKind::Test => &mut self.test,
        }
    }

    pub fn count(&self, kind: SplitKind, class: &str) -> usize {
        self.split(kind).get(class).copied().unwrap_or(0)
    }

    pub fn split_total(&self, kind: SplitKind) -> usize {
        self.split(kind).values().sum()
    }

    pub fn total(&self) -> usize {
        SplitKind::ALL.iter().map(|k| self.split_total(*k)).sum()
    }

    pub fn load(processed_dir: &Path) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(processed_dir.join(STATS_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, processed_dir: &Path) -> Result<PathBuf, DatasetError> {
        let path = processed_dir.join(STATS_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// 每个划分的类别数量与占比
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for kind in SplitKind::ALL {
            let total = self.split_total(kind);
            let _ = writeln!(out, "[{}]", kind.as_str().to_uppercase());
            for (class, count) in self.split(kind) {
                let percentage = if total > 0 {
                    *count as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                let _ = writeln!(out, "  {:12}: {:4} ({:5.1}%)", class, count, percentage);
            }
            let _ = writeln!(out, "  {:12}: {:4}", "Total", total);
        }
        out
    }
}

pub struct DatasetWriter {
    processed_dir: PathBuf,
    taxonomy: ClassTaxonomy,
}

impl DatasetWriter {
    pub fn new(processed_dir: impl Into<PathBuf>, taxonomy: ClassTaxonomy) -> Self {
        Self {
            processed_dir: processed_dir.into(),
            taxonomy,
        }
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    pub fn create_directories(&self) -> Result<(), DatasetError> {
        for kind in SplitKind::ALL {
            for class in self.taxonomy.classes() {
                fs::create_dir_all(self.processed_dir.join(kind.as_str()).join(class))?;
            }
        }
        Ok(())
    }

    /// 删除上一次运行留下的样本文件，返回删除数量
    pub fn clear_samples(&self) -> Result<usize, DatasetError> {
        let mut removed = 0;
        for kind in SplitKind::ALL {
            let split_dir = self.processed_dir.join(kind.as_str());
            if !split_dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&split_dir)? {
                let class_dir = entry?.path();
                if !class_dir.is_dir() {
                    continue;
                }
                for file in fs::read_dir(&class_dir)? {
                    let path = file?.path();
                    if path.is_file() && path.extension().map_or(false, |e| e == SAMPLE_EXTENSION) {
                        fs::remove_file(&path)?;
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            info!("🧹 Removed {} stale samples from {:?}", removed, self.processed_dir);
        }
        Ok(removed)
    }

    /// 写出所有样本与统计文件；序号在每个划分内递增
    pub fn write(&self, partition: &Partition) -> Result<DatasetStats, DatasetError> {
        self.clear_samples()?;
        self.create_directories()?;
        info!("💾 Writing {} samples to {:?}", partition.total(), self.processed_dir);

        let mut stats = DatasetStats::with_classes(&self.taxonomy);
        for split in partition.splits() {
            for (index, clip) in split.clips.iter().enumerate() {
                let path = sample_path(&self.processed_dir, split.kind, &clip.label, index);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                write_npy(&path, &clip.sample)?;
                *stats
                    .split_mut(split.kind)
                    .entry(clip.label.clone())
                    .or_insert(0) += 1;
            }
        }

        let stats_path = stats.save(&self.processed_dir)?;
        info!("✅ Stats saved: {:?}", stats_path);
        Ok(stats)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditMismatch {
    pub split: SplitKind,
    pub class: String,
    pub recorded: usize,
    pub on_disk: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub total_recorded: usize,
    pub total_on_disk: usize,
    pub mismatches: Vec<AuditMismatch>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

fn count_samples(dir: &Path) -> Result<usize, DatasetError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == SAMPLE_EXTENSION) {
            count += 1;
        }
    }
    Ok(count)
}

/// 核对统计文件与磁盘上的样本文件数
pub fn audit(processed_dir: &Path) -> Result<AuditReport, DatasetError> {
    let stats = DatasetStats::load(processed_dir)?;
    let mut report = AuditReport {
        total_recorded: stats.total(),
        ..Default::default()
    };

    for kind in SplitKind::ALL {
        let split_dir = processed_dir.join(kind.as_str());
        let mut classes: Vec<String> = stats.split(kind).keys().cloned().collect();
        if split_dir.is_dir() {
            for entry in fs::read_dir(&split_dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        if !classes.iter().any(|c| c == name) {
                            classes.push(name.to_string());
                        }
                    }
                }
            }
        }

        for class in classes {
            let on_disk = count_samples(&split_dir.join(&class))?;
            let recorded = stats.count(kind, &class);
            report.total_on_disk += on_disk;
            if on_disk != recorded {
                warn!(
                    "⚠️  Stats mismatch {}/{}: recorded {}, on disk {}",
                    kind, class, recorded, on_disk
                );
                report.mismatches.push(AuditMismatch {
                    split: kind,
                    class,
                    recorded,
                    on_disk,
                });
            }
        }
    }

    Ok(report)
}

/// 读回某个划分，返回 (样本, 类别下标)；读不出的文件记录日志后跳过
pub fn load_split(
    processed_dir: &Path,
    split: SplitKind,
    taxonomy: &ClassTaxonomy,
) -> Result<Vec<(FrameSample, usize)>, DatasetError> {
    info!("📂 Loading {} split from {:?}", split, processed_dir);
    let mut samples = Vec::new();

    for (class_index, class) in taxonomy.classes().iter().enumerate() {
        let class_dir = processed_dir.join(split.as_str()).join(class);
        if !class_dir.is_dir() {
            warn!("⚠️  类别目录不存在: {:?}", class_dir);
            continue;
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&class_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |e| e == SAMPLE_EXTENSION))
            .collect();
        paths.sort();

        let before = samples.len();
        for path in paths {
            match read_npy(&path) {
                Ok(sample) => samples.push((sample, class_index)),
                Err(e) => warn!("⚠️  Failed to load {:?}: {}", path, e),
            }
        }
        info!("  {}: {}", class, samples.len() - before);
    }

    Ok(samples)
}
