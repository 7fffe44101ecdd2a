use thiserror::Error;

use crate::app::BuildError;
use crate::config::ConfigError;
use crate::domain::RegistryError;
use crate::lock::LockError;
use crate::ports::StoreError;

/// Setup errors: anything that aborts a run before (or instead of) executing jobs.
///
/// Per-job failures are never represented here; they travel as data in
/// `JobResult` and the run summary.
#[derive(Debug, Error)]
pub enum MenderError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("unknown entity code {0:?}")]
    UnknownEntity(String),
}
