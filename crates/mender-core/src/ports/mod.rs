//! Ports - 抽象化レイヤー
//!
//! スケジューラが外部システムに触れる境界をすべて trait として定義します。
//! - InventorySource: availability / artifact ストア（read-only）
//! - TaskExecutor: 成果物生成の委譲先
//! - Clock: 時刻（テストで差し替え可能）

pub mod clock;
pub mod inventory_source;
pub mod task_executor;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::inventory_source::{InventorySource, StoreError};
pub use self::task_executor::{TaskExecutor, TaskRequest};
