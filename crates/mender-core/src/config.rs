//! Scheduler configuration.
//!
//! Every knob that used to be a module-level constant lives here and is
//! passed into the scheduler at construction time.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What to do with a job whose prerequisite in the same group did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    /// Run it anyway; it fails on its own terms (usually `InputMissing`).
    #[default]
    Attempt,

    /// Do not call the collaborator; record it as blocked.
    Skip,
}

impl FromStr for DependencyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attempt" => Ok(DependencyPolicy::Attempt),
            "skip" => Ok(DependencyPolicy::Skip),
            other => Err(ConfigError::Invalid(format!(
                "unknown dependency policy {other:?} (expected attempt|skip)"
            ))),
        }
    }
}

/// Immutable scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on groups with a job in flight at the same time.
    pub max_concurrent_groups: usize,

    pub dependency_policy: DependencyPolicy,

    /// Well-known path of the execution lock marker.
    pub lock_path: PathBuf,

    /// How often a blocked `acquire` re-checks the marker.
    pub lock_poll_interval_ms: u64,

    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_groups: 4,
            dependency_policy: DependencyPolicy::Attempt,
            lock_path: std::env::temp_dir().join("mender.lock"),
            lock_poll_interval_ms: 1_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_groups == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_groups must be at least 1".into(),
            ));
        }
        if self.lock_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "lock_poll_interval_ms must be at least 1".into(),
            ));
        }
        self.retry.validate()
    }
}
