//! Executor - groups を並列に、group 内の job を逐次に実行する
//!
//! # 並行モデル
//! - 1 group = 1 tokio task。`Semaphore` の permit を group の実行中ずっと保持する
//! - group 内の job は順番に await する（前の job が terminal になるまで次は始まらない）
//! - backoff の sleep はその group の task の中で行うので、他の group は止まらない
//! - collaborator 呼び出しは個別に spawn し、panic はその job の Terminal 失敗に変換する
//!
//! Results travel back through the `JoinSet`; no mutable state is shared
//! between groups.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::{DependencyPolicy, SchedulerConfig};
use crate::domain::{
    ArtifactRef, Decider, Decision, DefaultDecider, Group, JobRecord, JobResult, TaskError,
    TaskType,
};
use crate::ports::{Clock, SystemClock, TaskExecutor, TaskRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    /// Report planned jobs without calling the collaborator.
    DryRun,
}

#[derive(Clone)]
pub struct Executor {
    delegate: Arc<dyn TaskExecutor>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    max_concurrent_groups: usize,
    max_attempts: u32,
    dependency_policy: DependencyPolicy,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("max_concurrent_groups", &self.max_concurrent_groups)
            .field("max_attempts", &self.max_attempts)
            .field("dependency_policy", &self.dependency_policy)
            .finish()
    }
}

impl Executor {
    pub fn new(delegate: Arc<dyn TaskExecutor>, config: &SchedulerConfig) -> Self {
        Self {
            delegate,
            decider: Arc::new(DefaultDecider::new(config.retry.clone())),
            clock: Arc::new(SystemClock),
            max_concurrent_groups: config.max_concurrent_groups.max(1),
            max_attempts: config.retry.max_attempts.max(1),
            dependency_policy: config.dependency_policy,
        }
    }

    /// Replace the retry decider. The attempt ceiling from the config still applies.
    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_concurrent_groups(&self) -> usize {
        self.max_concurrent_groups
    }

    /// Run every group to completion and return one result per job,
    /// sorted by work key.
    ///
    /// Never fails: job failures are data in the returned results.
    pub async fn run(&self, groups: Vec<Group>, mode: ExecutionMode) -> Vec<JobResult> {
        if groups.is_empty() {
            return Vec::new();
        }

        let mut results = match mode {
            ExecutionMode::DryRun => plan(groups),
            ExecutionMode::Live => self.run_live(groups).await,
        };
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    async fn run_live(&self, groups: Vec<Group>) -> Vec<JobResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_groups));
        let mut set = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, Group> = HashMap::with_capacity(groups.len());

        tracing::info!(
            groups = groups.len(),
            max_concurrent_groups = self.max_concurrent_groups,
            "executing groups"
        );

        for group in groups {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let span = tracing::info_span!(
                "group",
                entity = %group.entity.code,
                period = %group.period
            );
            let owned = group.clone();
            let handle = set.spawn(
                async move {
                    // permit は group が終わるまで保持する
                    let _permit = semaphore.acquire_owned().await;
                    this.run_group(owned).await
                }
                .instrument(span),
            );
            pending.insert(handle.id(), group);
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, group_results)) => {
                    pending.remove(&id);
                    results.extend(group_results);
                }
                Err(e) => {
                    // run_group itself does not panic; this only covers runtime shutdown.
                    let reason = format!("group task aborted: {e}");
                    tracing::error!(error = %e, "group task did not complete");
                    if let Some(group) = pending.remove(&e.id()) {
                        results.extend(abandon(group, &reason, self.clock.as_ref()));
                    }
                }
            }
        }
        results
    }

    async fn run_group(&self, group: Group) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(group.len());
        let mut succeeded: HashMap<TaskType, bool> = HashMap::new();

        for gap in group.gaps {
            let task_type = gap.task_type();
            let mut job = JobRecord::new(gap);

            let blocked_by = task_type
                .prerequisite()
                .filter(|pre| succeeded.get(pre) == Some(&false));
            match (self.dependency_policy, blocked_by) {
                (DependencyPolicy::Skip, Some(pre)) => {
                    tracing::warn!(%task_type, prerequisite = %pre, "job blocked by failed prerequisite");
                    job.mark_blocked(pre);
                }
                _ => self.run_job(&mut job).await,
            }

            let result = job.into_result();
            succeeded.insert(task_type, result.is_success());
            results.push(result);
        }
        results
    }

    /// Drive one job through attempts until it succeeds or gives up.
    async fn run_job(&self, job: &mut JobRecord) {
        loop {
            let attempt = job.attempts() + 1;
            job.start_attempt(self.clock.now());

            let request = TaskRequest {
                entity: job.gap().entity.clone(),
                period: job.gap().period(),
                task_type: job.gap().task_type(),
                attempt,
            };
            tracing::debug!(task_type = %request.task_type, attempt, "attempt started");

            let error = match self.call(request).await {
                Ok(artifact) => {
                    tracing::info!(
                        task_type = %job.gap().task_type(),
                        attempt,
                        artifact = %artifact,
                        "job succeeded"
                    );
                    job.mark_succeeded(self.clock.now(), artifact);
                    return;
                }
                Err(error) => error,
            };

            let decision = if attempt >= self.max_attempts {
                Decision::GiveUp {
                    reason: format!("max attempts reached: {attempt}/{}", self.max_attempts),
                }
            } else {
                self.decider.decide(attempt, &error)
            };

            match decision {
                Decision::Retry { delay, reason } => {
                    tracing::warn!(
                        task_type = %job.gap().task_type(),
                        attempt,
                        error = %error,
                        %reason,
                        "attempt failed; retrying"
                    );
                    job.schedule_retry(self.clock.now(), error);
                    tokio::time::sleep(delay).await;
                }
                Decision::GiveUp { reason } => {
                    tracing::warn!(
                        task_type = %job.gap().task_type(),
                        attempt,
                        error = %error,
                        %reason,
                        "job failed"
                    );
                    job.mark_exhausted(self.clock.now(), error);
                    return;
                }
            }
        }
    }

    /// One delegated call in its own task, so a panic stays inside this job.
    async fn call(&self, request: TaskRequest) -> Result<ArtifactRef, TaskError> {
        let delegate = Arc::clone(&self.delegate);
        match tokio::spawn(async move { delegate.execute(&request).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(TaskError::terminal(format!("task executor panicked: {msg}")))
            }
            Err(e) => Err(TaskError::terminal(format!("task executor was cancelled: {e}"))),
        }
    }
}

fn plan(groups: Vec<Group>) -> Vec<JobResult> {
    groups
        .into_iter()
        .flat_map(|g| g.gaps)
        .map(|gap| {
            let mut job = JobRecord::new(gap);
            job.mark_planned();
            job.into_result()
        })
        .collect()
}

fn abandon(group: Group, reason: &str, clock: &dyn Clock) -> Vec<JobResult> {
    group
        .gaps
        .into_iter()
        .map(|gap| {
            let mut job = JobRecord::new(gap);
            let now = clock.now();
            job.start_attempt(now);
            job.mark_exhausted(now, TaskError::terminal(reason));
            job.into_result()
        })
        .collect()
}
