//! InMemoryInventory - テスト・組み込み用の inventory
//!
//! Facts live in a `Mutex<Vec<_>>` so tests can add artifacts between runs
//! (simulating the collaborator persisting its output).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{ArtifactRecord, AvailabilityFact};
use crate::ports::{InventorySource, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryInventory {
    availability: Mutex<Vec<AvailabilityFact>>,
    artifacts: Mutex<Vec<ArtifactRecord>>,
    unreachable: AtomicBool,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_availability(self, facts: impl IntoIterator<Item = AvailabilityFact>) -> Self {
        self.availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(facts);
        self
    }

    pub fn with_artifacts(self, records: impl IntoIterator<Item = ArtifactRecord>) -> Self {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
        self
    }

    pub fn add_availability(&self, fact: AvailabilityFact) {
        self.availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fact);
    }

    pub fn add_artifact(&self, record: ArtifactRecord) {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// While set, every read fails with `StoreError::Unreachable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("in-memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventorySource for InMemoryInventory {
    async fn availability(&self) -> Result<Vec<AvailabilityFact>, StoreError> {
        self.check_reachable()?;
        Ok(self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn artifacts(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        self.check_reachable()?;
        Ok(self
            .artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Period, Quarter, TaskType};

    #[tokio::test]
    async fn returns_what_was_added() {
        let p = Period::new(2024, Quarter::Q2);
        let inv = InMemoryInventory::new().with_availability([AvailabilityFact::new("1", p)]);
        inv.add_artifact(ArtifactRecord::new("1", p, TaskType::Extract));

        assert_eq!(inv.availability().await.unwrap().len(), 1);
        assert_eq!(inv.artifacts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_store_is_not_an_error() {
        let inv = InMemoryInventory::new();
        assert!(inv.availability().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_errors_instead_of_returning_empty() {
        let inv = InMemoryInventory::new();
        inv.set_unreachable(true);
        assert!(matches!(
            inv.availability().await,
            Err(StoreError::Unreachable(_))
        ));
        assert!(matches!(inv.artifacts().await, Err(StoreError::Unreachable(_))));

        inv.set_unreachable(false);
        assert!(inv.artifacts().await.is_ok());
    }
}
