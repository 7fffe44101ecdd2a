//! TaskType - the fixed set of work kinds and their intra-entity order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of work the scheduler can request for an (entity, period).
///
/// # 実行順序
/// 宣言順がそのまま同一 Group 内の実行順になります（`Extract` → `Report`）。
/// `Ord` は derive しているので、並べ替えはこの順序に従います。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Structured extraction from the raw filings.
    Extract,

    /// Narrative report built on top of the extraction.
    Report,
}

impl TaskType {
    /// All task types in declared execution order.
    pub const ALL: [TaskType; 2] = [TaskType::Extract, TaskType::Report];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Extract => "extract",
            TaskType::Report => "report",
        }
    }

    /// Position in the declared order (0-based).
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The task type whose artifact this one consumes, if any.
    pub fn prerequisite(self) -> Option<TaskType> {
        match self {
            TaskType::Extract => None,
            TaskType::Report => Some(TaskType::Extract),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task type: {0:?}")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_order_is_total() {
        assert!(TaskType::Extract < TaskType::Report);
        let ordinals: Vec<usize> = TaskType::ALL.iter().map(|t| t.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1]);
    }

    #[test]
    fn prerequisites_point_backwards() {
        for t in TaskType::ALL {
            if let Some(pre) = t.prerequisite() {
                assert!(pre < t, "{pre} must be declared before {t}");
            }
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Report".parse::<TaskType>().unwrap(), TaskType::Report);
        assert_eq!(" extract ".parse::<TaskType>().unwrap(), TaskType::Extract);
        assert!("summarize".parse::<TaskType>().is_err());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TaskType::Extract).unwrap(), "\"extract\"");
    }
}
