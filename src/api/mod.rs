pub mod detector;
pub mod preprocess;

pub use detector::AbnormalDetector;
pub use preprocess::{DatasetPreprocessor, PreprocessReport};
