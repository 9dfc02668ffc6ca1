pub mod corpus;
pub mod error;
pub mod npy;
pub mod partition;
pub mod store;

pub use corpus::{ClipLoader, CorpusSummary, LabeledClip, SkippedClip};
pub use error::DatasetError;
pub use npy::{read_npy, write_npy};
pub use partition::{partition, DatasetSplit, Partition, SplitKind, SplitRatios};
pub use store::{
    audit, load_split, sample_path, AuditMismatch, AuditReport, DatasetStats, DatasetWriter,
    STATS_FILE,
};
