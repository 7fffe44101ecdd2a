//! InventoryLoader - ストアとレジストリを突き合わせて snapshot を作る
//!
//! The only component that performs inventory I/O. Everything downstream
//! (detector, grouper) works on the frozen `InventorySnapshot`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{EntityId, EntityRegistry, InventorySnapshot, TaskType};
use crate::ports::{InventorySource, StoreError};

/// Caller-supplied filters. All three compose independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    pub entity: Option<EntityId>,
    pub task_type: Option<TaskType>,
    pub min_year: Option<u16>,
}

impl RunFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: impl Into<EntityId>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_min_year(mut self, year: u16) -> Self {
        self.min_year = Some(year);
        self
    }

    /// Task types in scope, in declared order.
    pub fn task_types(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| self.task_type.is_none_or(|only| only == *t))
            .collect()
    }

    fn admits(&self, entity_id: &EntityId, year: u16) -> bool {
        self.entity.as_ref().is_none_or(|only| only == entity_id)
            && self.min_year.is_none_or(|min| year >= min)
    }
}

pub struct InventoryLoader {
    source: Arc<dyn InventorySource>,
    registry: Arc<EntityRegistry>,
}

impl InventoryLoader {
    pub fn new(source: Arc<dyn InventorySource>, registry: Arc<EntityRegistry>) -> Self {
        Self { source, registry }
    }

    /// Read both stores once and resolve entities.
    ///
    /// # Errors
    ///
    /// Any store failure is returned as-is; an unreachable store never turns
    /// into an empty snapshot.
    pub async fn load(&self, filter: &RunFilter) -> Result<InventorySnapshot, StoreError> {
        let (availability, artifacts) =
            tokio::try_join!(self.source.availability(), self.source.artifacts())?;

        let mut snapshot = InventorySnapshot {
            task_types: filter.task_types(),
            ..InventorySnapshot::default()
        };

        // unknown id -> dropped row count (warn once per id)
        let mut unknown: BTreeMap<EntityId, usize> = BTreeMap::new();

        for fact in availability {
            if !filter.admits(&fact.entity_id, fact.year) {
                continue;
            }
            let Some(entity) = self.registry.get(&fact.entity_id) else {
                *unknown.entry(fact.entity_id).or_default() += 1;
                continue;
            };
            snapshot
                .entities
                .entry(entity.id.clone())
                .or_insert_with(|| entity.clone());
            let period = fact.period();
            snapshot
                .availability
                .entry((fact.entity_id, period))
                .or_default()
                .extend(fact.sources);
        }

        for (entity_id, rows) in &unknown {
            tracing::warn!(
                entity_id = %entity_id,
                rows,
                "availability rows reference an entity missing from the registry; dropped"
            );
        }

        snapshot.artifacts = artifacts
            .iter()
            .filter(|a| filter.admits(&a.entity_id, a.year))
            .filter(|a| snapshot.task_types.contains(&a.task_type))
            .map(|a| a.key())
            .collect();

        tracing::info!(
            pairs = snapshot.availability.len(),
            entities = snapshot.entities.len(),
            artifacts = snapshot.artifacts.len(),
            dropped_entities = unknown.len(),
            "inventory loaded"
        );
        Ok(snapshot)
    }
}
