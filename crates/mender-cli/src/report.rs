//! Rendering for stdout (text or JSON). Logs go to stderr.

use anyhow::Result;
use serde::Serialize;

use mender_core::domain::{EntityId, Group, Period, TaskType};
use mender_core::lock::{LockStatus, ReclaimOutcome};
use mender_core::RunSummary;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON.
    Json,
}

pub fn summary(summary: &RunSummary, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => summary.to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(summary)? + "\n",
    })
}

#[derive(Debug, Serialize)]
struct GroupView<'a> {
    entity_id: &'a EntityId,
    entity_code: &'a str,
    period: Period,
    task_types: Vec<TaskType>,
}

pub fn groups(groups: &[Group], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let views: Vec<GroupView<'_>> = groups
                .iter()
                .map(|g| GroupView {
                    entity_id: g.entity_id(),
                    entity_code: &g.entity.code,
                    period: g.period,
                    task_types: g.task_types(),
                })
                .collect();
            Ok(serde_json::to_string_pretty(&views)? + "\n")
        }
        OutputFormat::Text => {
            if groups.is_empty() {
                return Ok("no gaps\n".to_string());
            }
            let mut out = String::new();
            for g in groups {
                let types: Vec<&str> = g.gaps.iter().map(|gap| gap.task_type().as_str()).collect();
                out.push_str(&format!(
                    "{} ({}) {}: {}\n",
                    g.entity.code,
                    g.entity_id(),
                    g.period,
                    types.join(", ")
                ));
            }
            let total: usize = groups.iter().map(Group::len).sum();
            out.push_str(&format!("{total} gap(s) in {} group(s)\n", groups.len()));
            Ok(out)
        }
    }
}

pub fn lock_status(status: Option<&LockStatus>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&status)? + "\n"),
        OutputFormat::Text => Ok(match status {
            None => "unlocked\n".to_string(),
            Some(s) => format!(
                "locked by pid {} since {} ({}s ago){}\n",
                s.marker.pid,
                s.marker.acquired_at.to_rfc3339(),
                s.age_secs,
                if s.is_stale() {
                    "; holder is gone, run `mender lock reclaim`"
                } else {
                    ""
                }
            ),
        }),
    }
}

pub fn reclaim(outcome: &ReclaimOutcome) -> String {
    match outcome {
        ReclaimOutcome::NotLocked => "unlocked; nothing to reclaim\n".to_string(),
        ReclaimOutcome::HolderAlive(s) => {
            format!("lock holder pid {} is still running; not reclaimed\n", s.marker.pid)
        }
        ReclaimOutcome::Reclaimed(s) => {
            format!("reclaimed stale lock of pid {}\n", s.marker.pid)
        }
        ReclaimOutcome::RemovedCorrupt { reason } => {
            format!("removed unreadable lock marker ({reason})\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_core::app::{group, summarize};
    use mender_core::domain::{Entity, Gap, Quarter};

    fn sample_groups() -> Vec<Group> {
        let entity = Entity {
            id: EntityId::from("852218"),
            code: "JPM".into(),
            name: "JPMorgan Chase Bank".into(),
            class: "bank".into(),
            task_types: TaskType::ALL.to_vec(),
        };
        let p = Period::new(2024, Quarter::Q3);
        group(
            TaskType::ALL
                .into_iter()
                .map(|t| Gap::new(entity.clone(), p, t))
                .collect(),
        )
    }

    #[test]
    fn text_groups_list_task_types() {
        let out = groups(&sample_groups(), OutputFormat::Text).unwrap();
        assert!(out.contains("JPM (852218) 2024-Q3: extract, report"));
        assert!(out.ends_with("2 gap(s) in 1 group(s)\n"));
    }

    #[test]
    fn json_groups_are_an_array() {
        let out = groups(&sample_groups(), OutputFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v[0]["entity_code"], "JPM");
        assert_eq!(v[0]["task_types"][1], "report");
    }

    #[test]
    fn empty_groups_say_so() {
        assert_eq!(groups(&[], OutputFormat::Text).unwrap(), "no gaps\n");
    }

    #[test]
    fn summary_json_has_status() {
        let out = summary(&summarize(&[]), OutputFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "nothing_to_do");
    }

    #[test]
    fn reclaim_of_corrupt_marker_names_the_reason() {
        let out = reclaim(&ReclaimOutcome::RemovedCorrupt {
            reason: "EOF while parsing a value".into(),
        });
        assert_eq!(out, "removed unreadable lock marker (EOF while parsing a value)\n");
    }

    #[test]
    fn unlocked_status() {
        assert_eq!(lock_status(None, OutputFormat::Text).unwrap(), "unlocked\n");
        assert_eq!(lock_status(None, OutputFormat::Json).unwrap(), "null\n");
    }
}
