//! Gaps and groups.

use serde::Serialize;

use super::entity::Entity;
use super::ids::EntityId;
use super::inventory::WorkKey;
use super::period::Period;
use super::task_type::TaskType;

/// A unit of demanded-but-missing work. Derived every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub key: WorkKey,
    pub entity: Entity,
}

impl Gap {
    pub fn new(entity: Entity, period: Period, task_type: TaskType) -> Self {
        Self {
            key: WorkKey::new(entity.id.clone(), period, task_type),
            entity,
        }
    }

    pub fn period(&self) -> Period {
        self.key.period
    }

    pub fn task_type(&self) -> TaskType {
        self.key.task_type
    }
}

/// Gaps sharing one (entity, period), in declared task-type order.
///
/// Jobs of a group run strictly one after another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub entity: Entity,
    pub period: Period,
    pub gaps: Vec<Gap>,
}

impl Group {
    pub fn entity_id(&self) -> &EntityId {
        &self.entity.id
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        self.gaps.iter().map(Gap::task_type).collect()
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }
}
