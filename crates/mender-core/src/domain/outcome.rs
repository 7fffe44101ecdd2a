//! Outcome model: what the delegated task execution can return.
//!
//! The collaborator returns `Result<ArtifactRef, TaskError>`; the executor
//! never looks inside the artifact reference and only branches on the
//! `TaskError` variant.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a produced artifact (path, URL, row id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Classification of a failed attempt.
///
/// Serialized in snake_case, matching the `kind` tag of `TaskError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The data the task needs is not there (often an upstream task failed).
    InputMissing,

    /// Recoverable: timeout, rate limit, flaky dependency.
    Transient,

    /// Not recoverable by retrying (malformed input, no handler, panic).
    Terminal,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::InputMissing => "input missing",
            FailureKind::Transient => "transient",
            FailureKind::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Typed failure returned by a `TaskExecutor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum TaskError {
    #[error("input data missing: {0}")]
    InputMissing(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("terminal failure: {0}")]
    Terminal(String),
}

impl TaskError {
    pub fn input_missing(reason: impl Into<String>) -> Self {
        TaskError::InputMissing(reason.into())
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        TaskError::Transient(reason.into())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        TaskError::Terminal(reason.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TaskError::InputMissing(_) => FailureKind::InputMissing,
            TaskError::Transient(_) => FailureKind::Transient,
            TaskError::Terminal(_) => FailureKind::Terminal,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            TaskError::InputMissing(r) | TaskError::Transient(r) | TaskError::Terminal(r) => r,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(TaskError::transient("rate limited").is_retryable());
        assert!(!TaskError::input_missing("no extraction").is_retryable());
        assert!(!TaskError::terminal("bad xml").is_retryable());
    }

    #[test]
    fn failure_kind_uses_the_same_casing_as_task_error() {
        let s = serde_json::to_string(&FailureKind::InputMissing).unwrap();
        assert_eq!(s, "\"input_missing\"");
        let e = serde_json::to_value(TaskError::input_missing("no extraction")).unwrap();
        assert_eq!(e["kind"], "input_missing");
    }

    #[test]
    fn reason_is_preserved() {
        let e = TaskError::terminal("malformed filing");
        assert_eq!(e.reason(), "malformed filing");
        assert_eq!(e.kind(), FailureKind::Terminal);
        assert_eq!(e.to_string(), "terminal failure: malformed filing");
    }

    #[test]
    fn task_error_is_adjacently_tagged() {
        let v = serde_json::to_value(TaskError::transient("429")).unwrap();
        assert_eq!(v["kind"], "transient");
        assert_eq!(v["reason"], "429");
    }
}
