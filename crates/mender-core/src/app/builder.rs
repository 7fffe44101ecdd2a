//! SchedulerBuilder - スケジューラの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - registry / inventory / executor が揃っていなければ build() で失敗する
//! - registry の entity が必要とする task_type に route がなければ失敗する
//! - config は build() 時に validate する

use std::sync::Arc;

use super::executor::Executor;
use super::loader::InventoryLoader;
use super::scheduler::Scheduler;
use crate::config::{ConfigError, SchedulerConfig};
use crate::domain::{Decider, EntityRegistry, TaskType};
use crate::impls::{RouteError, TaskRouter};
use crate::lock::LockManager;
use crate::ports::{Clock, InventorySource, TaskExecutor};

/// BuildError はスケジューラ構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("scheduler is missing its {0}")]
    MissingComponent(&'static str),

    #[error("no task executor registered for task types {0:?}")]
    MissingRoutes(Vec<TaskType>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// # 使用例
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .config(config)
///     .registry(registry)
///     .inventory(Arc::new(JsonFileInventory::new("inventory/")))
///     .route(TaskType::Extract, extractor)?
///     .route(TaskType::Report, writer)?
///     .build()?;
/// ```
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    registry: Option<EntityRegistry>,
    inventory: Option<Arc<dyn InventorySource>>,
    router: TaskRouter,
    decider: Option<Arc<dyn Decider>>,
    clock: Option<Arc<dyn Clock>>,
    expected: Option<Vec<TaskType>>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn inventory(mut self, inventory: Arc<dyn InventorySource>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Executor for one task type.
    pub fn route(
        mut self,
        task_type: TaskType,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self, RouteError> {
        self.router.register(task_type, executor)?;
        Ok(self)
    }

    /// One executor for every task type (replaces earlier routes).
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.router = TaskRouter::uniform(executor);
        self
    }

    pub fn router(mut self, router: TaskRouter) -> Self {
        self.router = router;
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Task types that must have a route. Defaults to every task type some
    /// registered entity applies. An empty list allows building without any
    /// executor (dry runs only).
    pub fn expect_task_types(mut self, task_types: &[TaskType]) -> Self {
        self.expected = Some(task_types.to_vec());
        self
    }

    pub fn build(self) -> Result<Scheduler, BuildError> {
        self.config.validate()?;
        let registry = self
            .registry
            .ok_or(BuildError::MissingComponent("entity registry"))?;
        let inventory = self
            .inventory
            .ok_or(BuildError::MissingComponent("inventory source"))?;
        let expected = self.expected.unwrap_or_else(|| {
            let mut types: Vec<TaskType> = registry
                .iter()
                .flat_map(|e| e.task_types.iter().copied())
                .collect();
            types.sort();
            types.dedup();
            types
        });
        if self.router.is_empty() && !expected.is_empty() {
            return Err(BuildError::MissingComponent("task executor"));
        }
        let routed = self.router.routed_types();
        let missing: Vec<TaskType> = expected
            .into_iter()
            .filter(|t| !routed.contains(t))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingRoutes(missing));
        }

        let registry = Arc::new(registry);
        let loader = InventoryLoader::new(inventory, Arc::clone(&registry));

        let mut executor = Executor::new(Arc::new(self.router), &self.config);
        let mut lock = LockManager::new(
            self.config.lock_path.clone(),
            self.config.lock_poll_interval(),
        );
        if let Some(decider) = self.decider {
            executor = executor.with_decider(decider);
        }
        if let Some(clock) = self.clock {
            executor = executor.with_clock(Arc::clone(&clock));
            lock = lock.with_clock(clock);
        }

        Ok(Scheduler::new(self.config, registry, loader, executor, lock))
    }
}
