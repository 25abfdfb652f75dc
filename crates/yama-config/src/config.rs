//! Engine-level configuration: `.yama` directory settings that are not the
//! entity document itself (that stays the external config loader's
//! concern) -- environment policy overrides, retention defaults, and the
//! fixed merge-strategy constant.

use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The engine's one merge policy, exposed as a named constant (see §4.7:
/// "local wins on non-conflicting field change") so tests and callers
/// assert against a value rather than a magic string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    LocalWins,
}

pub const MERGE_STRATEGY: MergeStrategy = MergeStrategy::LocalWins;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPolicy {
    pub name: String,
    #[serde(default)]
    pub allow_dangerous: bool,
    /// The highest safety level ("safe", "requires_review", "unsafe",
    /// "dangerous") this environment will auto-deploy without a human
    /// pressing go. The applier owns the actual enum; config only carries
    /// the string so this crate stays independent of the core model.
    #[serde(default = "default_auto_deploy_max_level")]
    pub auto_deploy_max_level: String,
}

fn default_auto_deploy_max_level() -> String {
    "safe".to_string()
}

impl Default for EnvironmentPolicy {
    fn default() -> Self {
        EnvironmentPolicy {
            name: String::new(),
            allow_dangerous: false,
            auto_deploy_max_level: default_auto_deploy_max_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_shadow_column_days")]
    pub shadow_column_days: u32,
    #[serde(default = "default_backup_retention")]
    pub backup_retention: String,
}

fn default_shadow_column_days() -> u32 {
    30
}

fn default_backup_retention() -> String {
    "30d".to_string()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            shadow_column_days: default_shadow_column_days(),
            backup_retention: default_backup_retention(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub environments: Vec<EnvironmentPolicy>,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl EngineConfig {
    /// Returns the configured policy for `environment`, or a permissive
    /// default (no dangerous override, auto-deploy safe-only) if none was
    /// declared.
    pub fn policy_for(&self, environment: &str) -> EnvironmentPolicy {
        self.environments
            .iter()
            .find(|p| p.name == environment)
            .cloned()
            .unwrap_or_else(|| EnvironmentPolicy {
                name: environment.to_string(),
                ..EnvironmentPolicy::default()
            })
    }
}

/// Loads `{yama_dir}/config.yaml` layered with `YAMA_`-prefixed
/// environment variables, following the teacher's figment layering
/// (`Yaml::file(...)` merged with `Env::prefixed(...)`).
pub fn load(yama_dir: &Path) -> Result<EngineConfig, ConfigError> {
    let path = yama_dir.join("config.yaml");
    let figment = Figment::new()
        .merge(Yaml::file(&path))
        .merge(Env::prefixed("YAMA_"));
    Ok(figment.extract::<EngineConfig>()?)
}
