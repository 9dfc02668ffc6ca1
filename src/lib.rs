pub mod api;
pub mod config;
pub mod core;

pub use api::{AbnormalDetector, DatasetPreprocessor, PreprocessReport};
pub use config::{ConfigError, DetectorConfig, PipelineConfig, PreprocessConfig};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("cctv_lib_rust"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // 多次调用时忽略重复初始化
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
