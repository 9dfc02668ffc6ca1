//! 构建带标签的语料：`raw_dir/{class}/*` 下的每个片段抽帧并打标签
//!
//! 片段之间并行（每个片段只由一个 worker 持有），单个片段失败只跳过该片段。

use super::error::DatasetError;
use crate::core::inference::ClassTaxonomy;
use crate::core::video::{ClipOpener, FrameSample, FrameSampler, VideoError};
use log::{info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledClip {
    pub sample: FrameSample,
    pub label: String,
    pub source_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedClip {
    pub path: PathBuf,
    pub label: String,
    pub reason: String,
}

/// 运行结束时的汇总：处理成功数 vs 候选数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusSummary {
    pub candidates: usize,
    pub processed: usize,
    pub skipped: Vec<SkippedClip>,
}

impl CorpusSummary {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

pub struct ClipLoader<'a> {
    sampler: &'a FrameSampler,
    opener: &'a dyn ClipOpener,
    workers: usize,
}

impl<'a> ClipLoader<'a> {
    pub fn new(sampler: &'a FrameSampler, opener: &'a dyn ClipOpener) -> Self {
        Self {
            sampler,
            opener,
            workers: num_cpus::get().min(4),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// 候选片段：按类别顺序，类别内按路径排序
    pub fn discover(
        &self,
        raw_dir: &Path,
        taxonomy: &ClassTaxonomy,
    ) -> Result<Vec<(String, PathBuf)>, DatasetError> {
        let mut candidates = Vec::new();
        for class in taxonomy.classes() {
            let class_dir = raw_dir.join(class);
            if !class_dir.is_dir() {
                warn!("⚠️  类别目录不存在: {:?}", class_dir);
                continue;
            }

            let mut paths = Vec::new();
            for entry in fs::read_dir(&class_dir)? {
                let path = entry?.path();
                if self.opener.is_candidate(&path) {
                    paths.push(path);
                }
            }
            paths.sort();

            if paths.is_empty() {
                warn!("⚠️  {}: no clips found", class);
            }
            candidates.extend(paths.into_iter().map(|p| (class.clone(), p)));
        }
        Ok(candidates)
    }

    pub fn load_clip(&self, label: &str, path: &Path) -> Result<LabeledClip, VideoError> {
        let mut source = self.opener.open(path)?;
        let sample = self.sampler.sample(&mut source)?;
        Ok(LabeledClip {
            sample,
            label: label.to_string(),
            source_path: path.to_path_buf(),
        })
    }

    pub fn build_corpus(
        &self,
        raw_dir: &Path,
        taxonomy: &ClassTaxonomy,
    ) -> Result<(Vec<LabeledClip>, CorpusSummary), DatasetError> {
        let candidates = self.discover(raw_dir, taxonomy)?;
        info!(
            "📹 Sampling {} candidate clips with {} workers",
            candidates.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| DatasetError::WorkerPool(e.to_string()))?;

        let results: Vec<Result<LabeledClip, VideoError>> = pool.install(|| {
            candidates
                .par_iter()
                .map(|(label, path)| self.load_clip(label, path))
                .collect()
        });

        let mut summary = CorpusSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        let mut corpus = Vec::with_capacity(results.len());

        for ((label, path), result) in candidates.into_iter().zip(results) {
            match result {
                Ok(clip) => corpus.push(clip),
                Err(e) if e.is_clip_recoverable() => {
                    warn!("⚠️  Skipping {:?}: {}", path, e);
                    summary.skipped.push(SkippedClip {
                        path,
                        label,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        summary.processed = corpus.len();

        info!(
            "✅ {}/{} clips processed ({} skipped)",
            summary.processed,
            summary.candidates,
            summary.skipped_count()
        );
        Ok((corpus, summary))
    }
}
