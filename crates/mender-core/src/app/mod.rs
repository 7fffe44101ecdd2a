//! Application layer: the reconciliation pipeline.
//!
//! lock → loader → detector → grouper → executor → summary → release

pub mod builder;
pub mod detector;
pub mod executor;
pub mod grouper;
pub mod loader;
pub mod scheduler;
pub mod summary;

pub use builder::{BuildError, SchedulerBuilder};
pub use detector::detect;
pub use executor::{ExecutionMode, Executor};
pub use grouper::group;
pub use loader::{InventoryLoader, RunFilter};
pub use scheduler::{RunRequest, Scheduler};
pub use summary::{summarize, FailedJob, RunStatus, RunSummary};
