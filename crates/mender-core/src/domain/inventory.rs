//! Inventory facts: desired state (availability) and actual state (artifacts).
//!
//! Both are read-only from the scheduler's point of view. Upstream ingestion
//! owns availability rows; task execution owns artifact rows.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::ids::EntityId;
use super::period::{Period, Quarter};
use super::task_type::TaskType;

/// Raw availability row as stored upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityFact {
    pub entity_id: EntityId,
    pub year: u16,
    pub quarter: Quarter,

    /// Source categories the raw data is tagged with (e.g. "call_report").
    #[serde(default)]
    pub sources: Vec<String>,
}

impl AvailabilityFact {
    pub fn new(entity_id: impl Into<EntityId>, period: Period) -> Self {
        Self {
            entity_id: entity_id.into(),
            year: period.year,
            quarter: period.quarter,
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn period(&self) -> Period {
        Period::new(self.year, self.quarter)
    }
}

/// Raw artifact row: output already produced for (entity, period, task type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub entity_id: EntityId,
    pub year: u16,
    pub quarter: Quarter,
    pub task_type: TaskType,

    /// Where the artifact lives; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ArtifactRecord {
    pub fn new(entity_id: impl Into<EntityId>, period: Period, task_type: TaskType) -> Self {
        Self {
            entity_id: entity_id.into(),
            year: period.year,
            quarter: period.quarter,
            task_type,
            location: None,
        }
    }

    pub fn period(&self) -> Period {
        Period::new(self.year, self.quarter)
    }

    pub fn key(&self) -> WorkKey {
        WorkKey::new(self.entity_id.clone(), self.period(), self.task_type)
    }
}

/// (entity, period, task type): the identity of both an artifact and a gap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkKey {
    pub entity_id: EntityId,
    pub period: Period,
    pub task_type: TaskType,
}

impl WorkKey {
    pub fn new(entity_id: EntityId, period: Period, task_type: TaskType) -> Self {
        Self {
            entity_id,
            period,
            task_type,
        }
    }
}

impl std::fmt::Display for WorkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.entity_id, self.period, self.task_type)
    }
}

/// Frozen view of the inventory for one run.
///
/// Gap detection runs exactly once over this snapshot, so the set of keys
/// produced in a run has no duplicates.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    /// (entity, period) pairs with raw data available, plus their source tags.
    pub availability: BTreeMap<(EntityId, Period), BTreeSet<String>>,

    /// Work already produced.
    pub artifacts: HashSet<WorkKey>,

    /// Resolved entities referenced by `availability`.
    pub entities: BTreeMap<EntityId, Entity>,

    /// Task types in scope for this run (after the task-type filter).
    pub task_types: Vec<TaskType>,
}

impl InventorySnapshot {
    pub fn has_artifact(&self, key: &WorkKey) -> bool {
        self.artifacts.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.availability.is_empty()
    }
}
