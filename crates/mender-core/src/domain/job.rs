//! Job record and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::gap::Gap;
use super::ids::JobId;
use super::inventory::WorkKey;
use super::outcome::{ArtifactRef, FailureKind, TaskError};
use super::task_type::TaskType;

/// Job state.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> RetryScheduled -> Running (until max_attempts)
/// - Pending -> Running -> FailedExhausted (budget spent or non-retryable error)
/// - Pending -> Blocked (prerequisite failed and the dependency policy skips)
/// - Pending -> Planned (dry run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Not started yet.
    Pending,

    /// An attempt is in flight.
    Running,

    /// Waiting out a backoff delay.
    RetryScheduled,

    /// Finished successfully.
    Succeeded,

    /// Failed and will not be retried.
    FailedExhausted,

    /// Not attempted because its prerequisite did not succeed.
    Blocked,

    /// Dry run: would have been attempted.
    Planned,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::FailedExhausted | JobState::Blocked | JobState::Planned
        )
    }
}

/// One attempt of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

/// Mutable record the executor drives through the state machine.
///
/// All transitions go through methods; the fields are read-only outside.
#[derive(Debug, Clone)]
pub struct JobRecord {
    id: JobId,
    gap: Gap,
    state: JobState,
    attempts: Vec<AttemptRecord>,
    current_start: Option<DateTime<Utc>>,
    artifact: Option<ArtifactRef>,
    last_error: Option<TaskError>,
    blocked_by: Option<TaskType>,
}

impl JobRecord {
    pub fn new(gap: Gap) -> Self {
        Self {
            id: JobId::generate(),
            gap,
            state: JobState::Pending,
            attempts: Vec::new(),
            current_start: None,
            artifact: None,
            last_error: None,
            blocked_by: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn gap(&self) -> &Gap {
        &self.gap
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.len() as u32 + u32::from(self.current_start.is_some())
    }

    /// Pending/RetryScheduled -> Running.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        debug_assert!(matches!(
            self.state,
            JobState::Pending | JobState::RetryScheduled
        ));
        self.state = JobState::Running;
        self.current_start = Some(now);
    }

    /// Running -> Succeeded.
    pub fn mark_succeeded(&mut self, now: DateTime<Utc>, artifact: ArtifactRef) {
        self.finish_attempt(now, None);
        self.state = JobState::Succeeded;
        self.artifact = Some(artifact);
    }

    /// Running -> RetryScheduled.
    pub fn schedule_retry(&mut self, now: DateTime<Utc>, error: TaskError) {
        self.finish_attempt(now, Some(error.clone()));
        self.state = JobState::RetryScheduled;
        self.last_error = Some(error);
    }

    /// Running -> FailedExhausted.
    pub fn mark_exhausted(&mut self, now: DateTime<Utc>, error: TaskError) {
        self.finish_attempt(now, Some(error.clone()));
        self.state = JobState::FailedExhausted;
        self.last_error = Some(error);
    }

    /// Pending -> Blocked.
    pub fn mark_blocked(&mut self, prerequisite: TaskType) {
        debug_assert_eq!(self.state, JobState::Pending);
        self.state = JobState::Blocked;
        self.blocked_by = Some(prerequisite);
    }

    /// Pending -> Planned.
    pub fn mark_planned(&mut self) {
        debug_assert_eq!(self.state, JobState::Pending);
        self.state = JobState::Planned;
    }

    fn finish_attempt(&mut self, now: DateTime<Utc>, error: Option<TaskError>) {
        let started_at = self.current_start.take().unwrap_or(now);
        let attempt = self.attempts.len() as u32 + 1;
        self.attempts.push(AttemptRecord {
            attempt,
            started_at,
            finished_at: now,
            error,
        });
    }

    /// Freeze into a result. Only meaningful in a terminal state.
    pub fn into_result(self) -> JobResult {
        let outcome = match self.state {
            JobState::Succeeded => JobOutcome::Succeeded {
                artifact: self.artifact.unwrap_or_else(|| ArtifactRef::new("")),
            },
            JobState::Blocked => JobOutcome::Blocked {
                prerequisite: self.blocked_by.unwrap_or(TaskType::Extract),
            },
            JobState::Planned => JobOutcome::DryRun,
            // Pending/Running/RetryScheduled never reach here from the executor;
            // report them as failures rather than inventing a success.
            _ => {
                let error = self
                    .last_error
                    .unwrap_or_else(|| TaskError::terminal("job did not reach a terminal state"));
                JobOutcome::FailedExhausted {
                    kind: error.kind(),
                    reason: error.reason().to_string(),
                }
            }
        };

        JobResult {
            job_id: self.id,
            key: self.gap.key,
            entity_code: self.gap.entity.code,
            started_at: self.attempts.first().map(|a| a.started_at),
            finished_at: self.attempts.last().map(|a| a.finished_at),
            attempts: self.attempts,
            outcome,
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { artifact: ArtifactRef },
    FailedExhausted { kind: FailureKind, reason: String },
    Blocked { prerequisite: TaskType },
    DryRun,
}

/// Final record of one job, as handed to the result aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub key: WorkKey,
    pub entity_code: String,

    /// Start of the first attempt (None if never attempted).
    pub started_at: Option<DateTime<Utc>>,

    /// End of the last attempt.
    pub finished_at: Option<DateTime<Utc>>,

    pub attempts: Vec<AttemptRecord>,
    pub outcome: JobOutcome,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            JobOutcome::FailedExhausted { .. } | JobOutcome::Blocked { .. }
        )
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Human-readable failure reason, if the job failed.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.outcome {
            JobOutcome::FailedExhausted { kind, reason } => Some(format!("{kind}: {reason}")),
            JobOutcome::Blocked { prerequisite } => {
                Some(format!("blocked: prerequisite {prerequisite} did not succeed"))
            }
            _ => None,
        }
    }
}
