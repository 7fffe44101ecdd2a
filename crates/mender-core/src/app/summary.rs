//! Result aggregation: run summary and exit status.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{EntityId, JobOutcome, JobResult, Period, RunId, TaskType, WorkKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No gaps were found.
    NothingToDo,

    /// Every job succeeded.
    Completed,

    /// At least one job failed or was blocked.
    CompletedWithFailures,

    /// Jobs were planned but not executed.
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedJob {
    pub entity_id: EntityId,
    pub entity_code: String,
    pub period: Period,
    pub task_type: TaskType,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub status: RunStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,

    /// Earliest job start.
    pub started_at: Option<DateTime<Utc>>,

    /// Latest job end.
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub failures: Vec<FailedJob>,

    /// Dry run only: the jobs that would have run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<WorkKey>,
}

/// Fold job results into a summary.
pub fn summarize(results: &[JobResult]) -> RunSummary {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let failures: Vec<FailedJob> = results
        .iter()
        .filter_map(|r| {
            let reason = r.failure_reason()?;
            Some(FailedJob {
                entity_id: r.key.entity_id.clone(),
                entity_code: r.entity_code.clone(),
                period: r.key.period,
                task_type: r.key.task_type,
                attempts: r.attempt_count(),
                reason,
            })
        })
        .collect();
    let planned: Vec<WorkKey> = results
        .iter()
        .filter(|r| r.outcome == JobOutcome::DryRun)
        .map(|r| r.key.clone())
        .collect();

    let started_at = results.iter().filter_map(|r| r.started_at).min();
    let finished_at = results.iter().filter_map(|r| r.finished_at).max();
    let duration_ms = match (started_at, finished_at) {
        (Some(start), Some(end)) => u64::try_from((end - start).num_milliseconds()).unwrap_or(0),
        _ => 0,
    };

    let status = if results.is_empty() {
        RunStatus::NothingToDo
    } else if !failures.is_empty() {
        RunStatus::CompletedWithFailures
    } else if planned.len() == results.len() {
        RunStatus::DryRun
    } else {
        RunStatus::Completed
    };

    RunSummary {
        run_id: None,
        status,
        total: results.len(),
        succeeded,
        failed: failures.len(),
        started_at,
        finished_at,
        duration_ms,
        failures,
        planned,
    }
}

impl RunSummary {
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// 0 iff no job failed. Dry runs and nothing-to-do runs are 0.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 { 0 } else { 1 }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            RunStatus::NothingToDo => {
                return writeln!(f, "nothing to do: every available period is up to date");
            }
            RunStatus::DryRun => {
                writeln!(f, "dry run: {} job(s) would run", self.total)?;
                for key in &self.planned {
                    writeln!(f, "  {key}")?;
                }
                return Ok(());
            }
            RunStatus::Completed => write!(f, "run completed")?,
            RunStatus::CompletedWithFailures => write!(f, "run completed with failures")?,
        }
        writeln!(
            f,
            ": {} job(s), {} succeeded, {} failed in {:.1}s",
            self.total,
            self.succeeded,
            self.failed,
            self.duration().as_secs_f64()
        )?;
        if !self.failures.is_empty() {
            writeln!(f, "failed jobs:")?;
            for job in &self.failures {
                writeln!(
                    f,
                    "  {} ({}) {} {} after {} attempt(s): {}",
                    job.entity_code,
                    job.entity_id,
                    job.period,
                    job.task_type,
                    job.attempts,
                    job.reason
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttemptRecord, FailureKind, JobId, Quarter, TaskError};
    use chrono::Duration as ChronoDuration;

    fn result(id: &str, t: TaskType, offset_ms: i64, outcome: JobOutcome) -> JobResult {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
            + ChronoDuration::milliseconds(offset_ms);
        let end = start + ChronoDuration::milliseconds(100);
        let error = match &outcome {
            JobOutcome::FailedExhausted { reason, .. } => Some(TaskError::transient(reason.clone())),
            _ => None,
        };
        let attempts = match outcome {
            JobOutcome::Blocked { .. } | JobOutcome::DryRun => Vec::new(),
            _ => vec![AttemptRecord {
                attempt: 1,
                started_at: start,
                finished_at: end,
                error,
            }],
        };
        JobResult {
            job_id: JobId::generate(),
            key: WorkKey::new(EntityId::from(id), Period::new(2024, Quarter::Q1), t),
            entity_code: format!("E{id}"),
            started_at: attempts.first().map(|a| a.started_at),
            finished_at: attempts.last().map(|a| a.finished_at),
            attempts,
            outcome,
        }
    }

    fn ok() -> JobOutcome {
        JobOutcome::Succeeded {
            artifact: crate::domain::ArtifactRef::new("x"),
        }
    }

    #[test]
    fn no_results_is_nothing_to_do() {
        let s = summarize(&[]);
        assert_eq!(s.status, RunStatus::NothingToDo);
        assert_eq!(s.exit_code(), 0);
        assert!(s.to_string().starts_with("nothing to do"));
    }

    #[test]
    fn all_succeeded_exits_zero() {
        let s = summarize(&[
            result("1", TaskType::Extract, 0, ok()),
            result("1", TaskType::Report, 200, ok()),
        ]);
        assert_eq!(s.status, RunStatus::Completed);
        assert_eq!((s.total, s.succeeded, s.failed), (2, 2, 0));
        assert_eq!(s.exit_code(), 0);
        // earliest start (0) to latest end (200 + 100)
        assert_eq!(s.duration_ms, 300);
    }

    #[test]
    fn any_failure_exits_one_and_is_listed() {
        let s = summarize(&[
            result(
                "1",
                TaskType::Extract,
                0,
                JobOutcome::FailedExhausted {
                    kind: FailureKind::Transient,
                    reason: "503".into(),
                },
            ),
            result("1", TaskType::Report, 150, ok()),
            result("2", TaskType::Extract, 0, ok()),
        ]);
        assert_eq!(s.status, RunStatus::CompletedWithFailures);
        assert_eq!(s.failed, 1);
        assert_eq!(s.exit_code(), 1);
        assert_eq!(s.failures[0].entity_id, EntityId::from("1"));
        assert_eq!(s.failures[0].task_type, TaskType::Extract);
        assert_eq!(s.failures[0].reason, "transient: 503");

        let text = s.to_string();
        assert!(text.contains("with failures"));
        assert!(text.contains("E1 (1) 2024-Q1 extract"));
    }

    #[test]
    fn blocked_jobs_count_as_failures() {
        let s = summarize(&[
            result("1", TaskType::Extract, 0, JobOutcome::FailedExhausted {
                kind: FailureKind::Terminal,
                reason: "bad".into(),
            }),
            result("1", TaskType::Report, 0, JobOutcome::Blocked {
                prerequisite: TaskType::Extract,
            }),
        ]);
        assert_eq!(s.failed, 2);
        assert_eq!(s.exit_code(), 1);
    }

    #[test]
    fn dry_run_is_distinct_and_exits_zero() {
        let s = summarize(&[
            result("1", TaskType::Extract, 0, JobOutcome::DryRun),
            result("1", TaskType::Report, 0, JobOutcome::DryRun),
        ]);
        assert_eq!(s.status, RunStatus::DryRun);
        assert_eq!(s.planned.len(), 2);
        assert_eq!(s.exit_code(), 0);
        assert!(s.to_string().contains("1/2024-Q1/report"));
    }

    #[test]
    fn serializes_status_in_snake_case() {
        let s = summarize(&[]).with_run_id(RunId::generate());
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["status"], "nothing_to_do");
        assert!(v["run_id"].is_string());
        assert!(v.get("planned").is_none());
    }
}
