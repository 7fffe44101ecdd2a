//! JsonFileInventory - ディレクトリ内の JSON ファイルを inventory として読む
//!
//! Layout:
//! - `<dir>/availability.json`: array of `AvailabilityFact`
//! - `<dir>/artifacts.json`: array of `ArtifactRecord`
//!
//! A missing file means the store is not there (`Unreachable`); an empty
//! array means there is genuinely nothing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::domain::{ArtifactRecord, AvailabilityFact};
use crate::ports::{InventorySource, StoreError};

pub const AVAILABILITY_FILE: &str = "availability.json";
pub const ARTIFACTS_FILE: &str = "artifacts.json";

#[derive(Debug, Clone)]
pub struct JsonFileInventory {
    dir: PathBuf,
}

impl JsonFileInventory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_array<T>(&self, file: &str) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.dir.join(file);

        // ファイル I/O は blocking なので spawn_blocking で逃がす
        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path).map_err(|e| {
                StoreError::Unreachable(format!("cannot read {}: {e}", path.display()))
            })?;
            serde_json::from_slice::<Vec<T>>(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
        })
        .await
        .map_err(|e| StoreError::Unreachable(format!("inventory read task failed: {e}")))?
    }
}

#[async_trait]
impl InventorySource for JsonFileInventory {
    async fn availability(&self) -> Result<Vec<AvailabilityFact>, StoreError> {
        self.read_array(AVAILABILITY_FILE).await
    }

    async fn artifacts(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        self.read_array(ARTIFACTS_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityId, Period, Quarter, TaskType};

    fn write(dir: &Path, file: &str, body: &str) {
        std::fs::write(dir.join(file), body).unwrap();
    }

    #[tokio::test]
    async fn reads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            AVAILABILITY_FILE,
            r#"[{"entity_id": "852218", "year": 2024, "quarter": "Q3", "sources": ["call_report"]}]"#,
        );
        write(
            dir.path(),
            ARTIFACTS_FILE,
            r#"[{"entity_id": "852218", "year": 2024, "quarter": "Q3", "task_type": "extract"}]"#,
        );

        let inv = JsonFileInventory::new(dir.path());
        let facts = inv.availability().await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].entity_id, EntityId::from("852218"));
        assert_eq!(facts[0].period(), Period::new(2024, Quarter::Q3));
        assert_eq!(facts[0].sources, vec!["call_report".to_string()]);

        let artifacts = inv.artifacts().await.unwrap();
        assert_eq!(artifacts[0].task_type, TaskType::Extract);
        assert!(artifacts[0].location.is_none());
    }

    #[tokio::test]
    async fn empty_arrays_are_no_data() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), AVAILABILITY_FILE, "[]");
        write(dir.path(), ARTIFACTS_FILE, "[]");

        let inv = JsonFileInventory::new(dir.path());
        assert!(inv.availability().await.unwrap().is_empty());
        assert!(inv.artifacts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_unreachable() {
        let inv = JsonFileInventory::new("/nonexistent/mender-inventory");
        assert!(matches!(
            inv.availability().await,
            Err(StoreError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn malformed_json_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ARTIFACTS_FILE, r#"[{"entity_id": 1}]"#);

        let inv = JsonFileInventory::new(dir.path());
        assert!(matches!(inv.artifacts().await, Err(StoreError::Corrupt(_))));
    }
}
