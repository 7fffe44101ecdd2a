//! mender-core
//!
//! Reconciliation scheduler: compares the availability inventory (desired
//! state) with the artifact inventory (actual state) and runs the missing
//! work with bounded concurrency and retries.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, entity, period, task_type, inventory, gap, job, outcome, decision）
//! - **ports**: 抽象化レイヤー（InventorySource, TaskExecutor, Clock）
//! - **impls**: 実装（InMemoryInventory, JsonFileInventory, CommandExecutor, TaskRouter）
//! - **app**: パイプライン（loader, detector, grouper, executor, summary, scheduler, builder）
//! - **lock**: 実行ロック（1 ホスト 1 スケジューラ）
//! - **retry** / **config** / **error**: リトライポリシー、設定、セットアップエラー

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod lock;
pub mod ports;
pub mod retry;

pub use app::{RunFilter, RunRequest, RunStatus, RunSummary, Scheduler, SchedulerBuilder};
pub use config::{DependencyPolicy, SchedulerConfig};
pub use error::MenderError;
pub use lock::{AcquireMode, LockManager};
pub use retry::RetryPolicy;
