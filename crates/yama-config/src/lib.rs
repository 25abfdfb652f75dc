//! Engine-level configuration for the migration engine: `.yama` directory
//! discovery, environment policy overrides, and retention defaults.

pub mod config;
pub mod dir;
pub mod error;

pub use config::{load, EngineConfig, EnvironmentPolicy, MergeStrategy, RetentionConfig, MERGE_STRATEGY};
pub use dir::{ensure_yama_dir, find_yama_dir, find_yama_dir_or_error, YAMA_DIR_ENV, YAMA_DIR_NAME};
pub use error::ConfigError;
