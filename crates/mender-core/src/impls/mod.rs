//! Implementations - ports の具体実装
//!
//! - InMemoryInventory / JsonFileInventory: InventorySource
//! - CommandExecutor: 外部コマンドへの委譲
//! - TaskRouter: task_type ごとの TaskExecutor 振り分け
//! - ScriptedExecutor: テスト用 (`testing` feature)

pub mod command_executor;
pub mod json_inventory;
pub mod memory_inventory;
pub mod router;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use command_executor::CommandExecutor;
pub use json_inventory::JsonFileInventory;
pub use memory_inventory::InMemoryInventory;
pub use router::{RouteError, TaskRouter};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{CallRecord, ScriptedExecutor, Step};
