//! `mender.toml`: scheduler config plus where the registry, inventory and
//! task command live.
//!
//! ```toml
//! registry = "entities.toml"
//! inventory = "inventory/"
//! max_concurrent_groups = 4
//!
//! [retry]
//! max_attempts = 3
//!
//! [executor]
//! command = ["python3", "run_task.py"]
//! timeout_secs = 900
//!
//! [executor.overrides]
//! report = ["python3", "write_report.py"]
//! ```
//!
//! Relative paths are resolved against the settings file's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use mender_core::domain::TaskType;
use mender_core::impls::{CommandExecutor, TaskRouter};
use mender_core::SchedulerConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub scheduler: SchedulerConfig,

    /// Entity registry TOML.
    pub registry: Option<PathBuf>,

    /// Directory with `availability.json` and `artifacts.json`.
    pub inventory: Option<PathBuf>,

    pub executor: ExecutorSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// `[program, args...]` used for every task type without an override.
    pub command: Vec<String>,

    pub overrides: BTreeMap<TaskType, Vec<String>>,

    pub timeout_secs: Option<u64>,
}

impl Settings {
    pub fn from_toml_str(s: &str, base: &Path) -> Result<Self> {
        let mut settings: Settings = toml::from_str(s).context("settings file is not valid")?;
        settings.scheduler.validate()?;
        settings.registry = settings.registry.map(|p| base.join(p));
        settings.inventory = settings.inventory.map(|p| base.join(p));
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&contents, base)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn registry_path(&self) -> Result<&Path> {
        match &self.registry {
            Some(p) => Ok(p),
            None => bail!("settings do not name an entity registry (`registry = ...`)"),
        }
    }

    pub fn inventory_dir(&self) -> Result<&Path> {
        match &self.inventory {
            Some(p) => Ok(p),
            None => bail!("settings do not name an inventory directory (`inventory = ...`)"),
        }
    }

    /// One `CommandExecutor` per task type that has a command.
    pub fn router(&self) -> Result<TaskRouter> {
        let timeout = self.executor.timeout_secs.map(Duration::from_secs);
        let mut router = TaskRouter::new();
        for task_type in TaskType::ALL {
            let argv = self
                .executor
                .overrides
                .get(&task_type)
                .unwrap_or(&self.executor.command);
            let Some(mut exec) = CommandExecutor::from_argv(argv) else {
                continue;
            };
            if let Some(timeout) = timeout {
                exec = exec.with_timeout(timeout);
            }
            router.register(task_type, Arc::new(exec))?;
        }
        Ok(router)
    }
}
