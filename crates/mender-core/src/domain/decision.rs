//! Decision model: what to do after a failed attempt.
//!
//! The Decider is a pure function of (attempts so far, error); the executor
//! carries out the decision (sleep then retry, or give up).

use std::time::Duration;

use super::outcome::TaskError;
use crate::retry::RetryPolicy;

/// The next action for a job after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run the job again after `delay`.
    Retry { delay: Duration, reason: String },

    /// Stop: the job ends as `FailedExhausted`.
    GiveUp { reason: String },
}

/// Decides retry vs. give-up for a failed attempt.
///
/// Deciders are pure: no sleeping, no state mutation.
pub trait Decider: Send + Sync {
    /// * `attempts` - attempts already made, including the one that just failed.
    fn decide(&self, attempts: u32, error: &TaskError) -> Decision;
}

/// Attempt-budget decider with exponential backoff.
///
/// - Non-retryable errors give up immediately, even with attempts left.
/// - Retryable errors retry until `max_attempts` is reached.
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, attempts: u32, error: &TaskError) -> Decision {
        let max_attempts = self.retry_policy.max_attempts;
        if !error.is_retryable() {
            Decision::GiveUp {
                reason: format!("{} error is not retried", error.kind()),
            }
        } else if attempts >= max_attempts {
            Decision::GiveUp {
                reason: format!("max attempts reached: {attempts}/{max_attempts}"),
            }
        } else {
            let delay = self.retry_policy.next_delay(attempts);
            Decision::Retry {
                delay,
                reason: format!(
                    "retry attempt {}/{} after {:?}",
                    attempts + 1,
                    max_attempts,
                    delay
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decider() -> DefaultDecider {
        DefaultDecider::new(RetryPolicy::default())
    }

    #[test]
    fn transient_failures_retry_with_backoff() {
        let d = decider();
        match d.decide(1, &TaskError::transient("timeout")) {
            Decision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(5)),
            other => panic!("expected retry, got {other:?}"),
        }
        match d.decide(2, &TaskError::transient("timeout")) {
            Decision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(10)),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn gives_up_when_budget_is_spent() {
        let d = decider();
        assert!(matches!(
            d.decide(3, &TaskError::transient("timeout")),
            Decision::GiveUp { .. }
        ));
    }

    #[test]
    fn non_retryable_errors_give_up_on_first_attempt() {
        let d = decider();
        assert!(matches!(
            d.decide(1, &TaskError::terminal("bad input")),
            Decision::GiveUp { .. }
        ));
        assert!(matches!(
            d.decide(1, &TaskError::input_missing("no extraction")),
            Decision::GiveUp { .. }
        ));
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let d = DefaultDecider::new(RetryPolicy::fast(1, 1));
        assert!(matches!(
            d.decide(1, &TaskError::transient("x")),
            Decision::GiveUp { .. }
        ));
    }
}
