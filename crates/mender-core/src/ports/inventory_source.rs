//! InventorySource port - desired/actual state の読み出し
//!
//! 実装は外部ストア（RDB、ファイル、メモリ）への read-only クエリです。
//!
//! # 設計原則
//! - 接続できない場合は必ず `StoreError` を返す（空の結果と混同しない）
//! - 空の Vec は「本当にデータがない」ことだけを意味する

use async_trait::async_trait;

use crate::domain::{ArtifactRecord, AvailabilityFact};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("inventory store unreachable: {0}")]
    Unreachable(String),

    #[error("inventory store returned malformed data: {0}")]
    Corrupt(String),
}

/// Read-only access to the two inventory stores.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Raw data known to be available (desired state).
    async fn availability(&self) -> Result<Vec<AvailabilityFact>, StoreError>;

    /// Artifacts already produced (actual state).
    async fn artifacts(&self) -> Result<Vec<ArtifactRecord>, StoreError>;
}
