//! Scheduler - 1 回の起動で lock → load → detect → group → execute → summarize → release
//!
//! Setup errors (`MenderError`) abort the run before any job starts. Job
//! failures never do; they come back inside the `RunSummary`.

use std::sync::Arc;

use tracing::Instrument;

use super::detector::detect;
use super::executor::{ExecutionMode, Executor};
use super::grouper::group;
use super::loader::{InventoryLoader, RunFilter};
use super::summary::{summarize, RunSummary};
use crate::config::SchedulerConfig;
use crate::domain::{EntityId, EntityRegistry, Group, RunId};
use crate::error::MenderError;
use crate::lock::{AcquireMode, LockManager};

/// Per-invocation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub filter: RunFilter,
    pub dry_run: bool,
    pub lock_mode: AcquireMode,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            filter: RunFilter::all(),
            dry_run: false,
            lock_mode: AcquireMode::Blocking,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<EntityRegistry>,
    loader: InventoryLoader,
    executor: Executor,
    lock: LockManager,
}

impl Scheduler {
    pub(crate) fn new(
        config: SchedulerConfig,
        registry: Arc<EntityRegistry>,
        loader: InventoryLoader,
        executor: Executor,
        lock: LockManager,
    ) -> Self {
        Self {
            config,
            registry,
            loader,
            executor,
            lock,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    /// Map a registry code (case-insensitive) to the entity's stable id.
    pub fn resolve_entity(&self, code: &str) -> Result<EntityId, MenderError> {
        self.registry
            .by_code(code)
            .map(|e| e.id.clone())
            .ok_or_else(|| MenderError::UnknownEntity(code.to_string()))
    }

    /// Load, detect and group without locking or executing.
    pub async fn plan(&self, filter: &RunFilter) -> Result<Vec<Group>, MenderError> {
        let snapshot = self.loader.load(filter).await?;
        let gaps = detect(&snapshot);
        let groups = group(gaps);
        tracing::info!(
            gaps = groups.iter().map(Group::len).sum::<usize>(),
            groups = groups.len(),
            "gaps detected"
        );
        Ok(groups)
    }

    /// One full reconciliation pass.
    ///
    /// Dry runs do not take the execution lock; they never call the collaborator.
    pub async fn run(&self, request: RunRequest) -> Result<RunSummary, MenderError> {
        let run_id = RunId::generate();
        let span = tracing::info_span!("run", %run_id, dry_run = request.dry_run);
        self.run_inner(run_id, request).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: RunId,
        request: RunRequest,
    ) -> Result<RunSummary, MenderError> {
        if request.dry_run {
            let groups = self.plan(&request.filter).await?;
            let results = self.executor.run(groups, ExecutionMode::DryRun).await;
            return Ok(summarize(&results).with_run_id(run_id));
        }

        let handle = self.lock.acquire(request.lock_mode).await?;
        tracing::info!(bypassed = handle.is_bypassed(), "execution lock acquired");

        let outcome = match self.plan(&request.filter).await {
            Ok(groups) => {
                let results = self.executor.run(groups, ExecutionMode::Live).await;
                Ok(summarize(&results).with_run_id(run_id))
            }
            Err(e) => Err(e),
        };

        if let Err(e) = handle.release() {
            tracing::warn!(error = %e, "execution lock release failed");
        }

        let summary = outcome.inspect_err(|e| tracing::error!(error = %e, "run aborted"))?;
        tracing::info!(
            status = ?summary.status,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }
}
