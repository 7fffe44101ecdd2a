//! Domain model (ids, entities, periods, inventory facts, gaps, jobs, outcomes).
//!
//! このモジュールは I/O を一切持たない純粋なデータモデルです。
//! - 入力側: entity, period, task_type, inventory
//! - 計算結果: gap（Gap / Group）
//! - 実行側: job, outcome, decision

pub mod decision;
pub mod entity;
pub mod gap;
pub mod ids;
pub mod inventory;
pub mod job;
pub mod outcome;
pub mod period;
pub mod task_type;

pub use decision::{Decider, Decision, DefaultDecider};
pub use entity::{Entity, EntityRegistry, RegistryError};
pub use gap::{Gap, Group};
pub use ids::{EntityId, JobId, RunId};
pub use inventory::{ArtifactRecord, AvailabilityFact, InventorySnapshot, WorkKey};
pub use job::{AttemptRecord, JobOutcome, JobRecord, JobResult, JobState};
pub use outcome::{ArtifactRef, FailureKind, TaskError};
pub use period::{Period, PeriodParseError, Quarter};
pub use task_type::{TaskType, UnknownTaskType};
