use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ArtifactRef, TaskError, TaskType};
use crate::ports::{TaskExecutor, TaskRequest};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("an executor is already registered for task type {0}")]
    DuplicateRoute(TaskType),
}

/// Routes each task type to its executor (task_type -> executor).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during the run (immutable, shared behind `Arc`).
#[derive(Default, Clone)]
pub struct TaskRouter {
    routes: HashMap<TaskType, Arc<dyn TaskExecutor>>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        task_type: TaskType,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<(), RouteError> {
        if self.routes.contains_key(&task_type) {
            return Err(RouteError::DuplicateRoute(task_type));
        }
        self.routes.insert(task_type, executor);
        Ok(())
    }

    /// Same executor for every task type.
    pub fn uniform(executor: Arc<dyn TaskExecutor>) -> Self {
        let routes = TaskType::ALL
            .into_iter()
            .map(|t| (t, Arc::clone(&executor)))
            .collect();
        Self { routes }
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<dyn TaskExecutor>> {
        self.routes.get(&task_type)
    }

    /// Registered task types in declared order.
    pub fn routed_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.routes.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for TaskRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRouter")
            .field("routes", &self.routed_types())
            .finish()
    }
}

#[async_trait]
impl TaskExecutor for TaskRouter {
    async fn execute(&self, request: &TaskRequest) -> Result<ArtifactRef, TaskError> {
        let executor = self.get(request.task_type).ok_or_else(|| {
            TaskError::terminal(format!(
                "no executor registered for task type {}",
                request.task_type
            ))
        })?;
        executor.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, EntityId, Period, Quarter};

    struct Named(&'static str);

    #[async_trait]
    impl TaskExecutor for Named {
        async fn execute(&self, _request: &TaskRequest) -> Result<ArtifactRef, TaskError> {
            Ok(ArtifactRef::new(self.0))
        }
    }

    fn request(task_type: TaskType) -> TaskRequest {
        TaskRequest {
            entity: Entity {
                id: EntityId::from("1"),
                code: "ONE".into(),
                name: "One".into(),
                class: "default".into(),
                task_types: TaskType::ALL.to_vec(),
            },
            period: Period::new(2024, Quarter::Q1),
            task_type,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn routes_by_task_type() {
        let mut router = TaskRouter::new();
        router
            .register(TaskType::Extract, Arc::new(Named("extractor")))
            .unwrap();
        router
            .register(TaskType::Report, Arc::new(Named("writer")))
            .unwrap();

        let a = router.execute(&request(TaskType::Extract)).await.unwrap();
        let b = router.execute(&request(TaskType::Report)).await.unwrap();
        assert_eq!(a.as_str(), "extractor");
        assert_eq!(b.as_str(), "writer");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut router = TaskRouter::new();
        router
            .register(TaskType::Extract, Arc::new(Named("a")))
            .unwrap();
        let err = router
            .register(TaskType::Extract, Arc::new(Named("b")))
            .unwrap_err();
        assert!(matches!(err, RouteError::DuplicateRoute(TaskType::Extract)));
    }

    #[tokio::test]
    async fn unrouted_type_is_a_terminal_failure() {
        let mut router = TaskRouter::new();
        router
            .register(TaskType::Extract, Arc::new(Named("a")))
            .unwrap();

        let err = router.execute(&request(TaskType::Report)).await.unwrap_err();
        assert!(matches!(err, TaskError::Terminal(_)));
        assert!(err.reason().contains("report"));
    }

    #[test]
    fn uniform_router_covers_every_type() {
        let router = TaskRouter::uniform(Arc::new(Named("all")));
        assert_eq!(router.routed_types(), TaskType::ALL.to_vec());
    }
}
