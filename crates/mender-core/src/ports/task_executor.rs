//! TaskExecutor port - 実際の成果物生成を委譲する境界
//!
//! 成果物の中身（抽出、要約、レンダリング）はこのクレートの外側の責務です。
//! 成功時に ArtifactRecord を永続化するのも collaborator 側です。

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{ArtifactRef, Entity, EntityId, Period, TaskError, TaskType};

/// Everything a collaborator needs to run one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRequest {
    pub entity: Entity,
    pub period: Period,
    pub task_type: TaskType,

    /// 1-indexed attempt number.
    pub attempt: u32,
}

impl TaskRequest {
    pub fn entity_id(&self) -> &EntityId {
        &self.entity.id
    }
}

/// Executes one task type for one (entity, period).
///
/// # エラー分類
/// - `TaskError::Transient`: リトライ対象
/// - `TaskError::InputMissing` / `TaskError::Terminal`: 即座に失敗扱い
///
/// Timeouts are the implementation's responsibility; the executor waits as
/// long as the returned future takes.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, request: &TaskRequest) -> Result<ArtifactRef, TaskError>;
}
