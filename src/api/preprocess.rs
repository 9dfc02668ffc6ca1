//! 数据集预处理：抽帧 -> 划分 -> 落盘

use crate::config::PreprocessConfig;
use crate::core::dataset::{
    partition, ClipLoader, CorpusSummary, DatasetError, DatasetStats, DatasetWriter,
};
use crate::core::inference::ClassTaxonomy;
use crate::core::video::{ClipOpener, FrameSampler, ImageSequenceOpener};
use log::{error, info};
use std::path::PathBuf;

/// 一次预处理运行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessReport {
    pub corpus: CorpusSummary,
    pub stats: DatasetStats,
    pub stats_path: PathBuf,
}

/// 数据集预处理器
///
/// ```ignore
/// let preprocessor = DatasetPreprocessor::create(PreprocessConfig::default(), ClassTaxonomy::closed_world())?;
/// let report = preprocessor.run()?;
/// ```
pub struct DatasetPreprocessor {
    config: PreprocessConfig,
    taxonomy: ClassTaxonomy,
    sampler: FrameSampler,
    opener: Box<dyn ClipOpener>,
}

impl DatasetPreprocessor {
    pub fn create(config: PreprocessConfig, taxonomy: ClassTaxonomy) -> Result<Self, DatasetError> {
        crate::init_logging();
        config.ratios()?;
        let sampler = FrameSampler::new(config.sampler.clone())?;
        info!(
            "🎬 DatasetPreprocessor: {:?} -> {:?} ({} classes)",
            config.raw_dir,
            config.processed_dir,
            taxonomy.len()
        );
        Ok(Self {
            config,
            taxonomy,
            sampler,
            opener: Box::new(ImageSequenceOpener),
        })
    }

    pub fn with_opener(mut self, opener: Box<dyn ClipOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn run(&self) -> Result<PreprocessReport, DatasetError> {
        info!("{}", "=".repeat(60));
        info!("🎬 Dataset preprocessing started");
        info!("{}", "=".repeat(60));

        let mut loader = ClipLoader::new(&self.sampler, self.opener.as_ref());
        if let Some(workers) = self.config.workers {
            loader = loader.with_workers(workers);
        }
        let (corpus, summary) = loader.build_corpus(&self.config.raw_dir, &self.taxonomy)?;
        if corpus.is_empty() {
            error!("❌ No clips processed from {:?}", self.config.raw_dir);
            return Err(DatasetError::EmptyCorpus);
        }

        let parts = partition(corpus, self.config.ratios()?, self.config.seed)?;
        let writer = DatasetWriter::new(self.config.processed_dir.clone(), self.taxonomy.clone());
        let stats = writer.write(&parts)?;

        info!("📊 Dataset statistics:\n{}", stats.summary());
        info!(
            "✅ Preprocessing complete: {}/{} clips, {} skipped",
            summary.processed,
            summary.candidates,
            summary.skipped_count()
        );

        Ok(PreprocessReport {
            corpus: summary,
            stats,
            stats_path: self.config.processed_dir.join(crate::core::dataset::STATS_FILE),
        })
    }
}

impl Drop for DatasetPreprocessor {
    fn drop(&mut self) {
        info!("🗑️ DatasetPreprocessor: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::{audit, load_split, SplitKind};
    use crate::core::video::source::test_support::write_png_clip;
    use crate::core::video::SamplerConfig;

    fn config(root: &std::path::Path) -> PreprocessConfig {
        PreprocessConfig {
            raw_dir: root.join("raw"),
            processed_dir: root.join("processed"),
            sampler: SamplerConfig {
                frames_per_clip: 4,
                frame_size: (4, 4),
            },
            workers: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_run_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        for i in 0..6 {
            write_png_clip(&raw.join(format!("fall/clip_{}", i)), 6, 8, 8);
            write_png_clip(&raw.join(format!("normal/clip_{}", i)), 5, 8, 8);
        }
        write_png_clip(&raw.join("fire/short"), 2, 8, 8);

        let preprocessor =
            DatasetPreprocessor::create(config(tmp.path()), ClassTaxonomy::closed_world()).unwrap();
        let report = preprocessor.run().unwrap();

        assert_eq!(report.corpus.candidates, 13);
        assert_eq!(report.corpus.processed, 12);
        assert_eq!(report.corpus.skipped_count(), 1);
        assert_eq!(report.stats.total(), 12);
        assert_eq!(report.stats.split_total(SplitKind::Train), 8);
        assert!(report.stats_path.is_file());

        let processed = tmp.path().join("processed");
        assert!(audit(&processed).unwrap().is_consistent());
        assert!(processed.join("test/vulnerable").is_dir());

        let train = load_split(&processed, SplitKind::Train, &ClassTaxonomy::closed_world()).unwrap();
        assert_eq!(train.len(), 8);
        assert!(train.iter().all(|(s, _)| s.shape() == [4, 4, 4, 3]));
    }

    #[test]
    fn test_empty_raw_dir_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let preprocessor =
            DatasetPreprocessor::create(config(tmp.path()), ClassTaxonomy::closed_world()).unwrap();
        assert!(matches!(preprocessor.run(), Err(DatasetError::EmptyCorpus)));
        assert!(!tmp.path().join("processed").join("dataset_stats.json").exists());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bad_ratios = config(tmp.path());
        bad_ratios.train_ratio = 0.9;
        bad_ratios.val_ratio = 0.2;
        assert!(matches!(
            DatasetPreprocessor::create(bad_ratios, ClassTaxonomy::closed_world()),
            Err(DatasetError::InvalidRatios(_))
        ));

        let mut bad_sampler = config(tmp.path());
        bad_sampler.sampler.frames_per_clip = 0;
        assert!(matches!(
            DatasetPreprocessor::create(bad_sampler, ClassTaxonomy::closed_world()),
            Err(DatasetError::Video(_))
        ));
    }
}
