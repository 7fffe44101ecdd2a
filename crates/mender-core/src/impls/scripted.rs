//! ScriptedExecutor - テスト用の TaskExecutor
//!
//! Responses are scripted per work key; unscripted calls succeed. Every call
//! is recorded with its start/end instants, and the executor tracks how many
//! calls were in flight at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::{ArtifactRef, TaskError, WorkKey};
use crate::ports::{TaskExecutor, TaskRequest};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(TaskError),
    Panic,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub key: WorkKey,
    pub attempt: u32,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<WorkKey, VecDeque<Step>>>,
    delay: Duration,
    calls: Mutex<Vec<CallRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long every call takes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue responses for `key`, consumed one per call.
    pub fn script(self, key: WorkKey, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .extend(steps);
        self
    }

    /// Make `key` fail with `error` on every call.
    pub fn always_fail(self, key: WorkKey, error: TaskError, times: usize) -> Self {
        self.script(key, std::iter::repeat_n(Step::Fail(error), times))
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_for(&self, key: &WorkKey) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| &c.key == key)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, key: &WorkKey) -> Step {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed)
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, request: &TaskRequest) -> Result<ArtifactRef, TaskError> {
        let key = WorkKey::new(
            request.entity_id().clone(),
            request.period,
            request.task_type,
        );
        let step = self.next_step(&key);

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let started = Instant::now();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CallRecord {
                key: key.clone(),
                attempt: request.attempt,
                started,
                finished: Instant::now(),
            });

        match step {
            Step::Succeed => Ok(ArtifactRef::new(format!("mem://{key}"))),
            Step::Fail(error) => Err(error),
            Step::Panic => panic!("scripted panic for {key}"),
        }
    }
}
