use crate::backend::{AgentBackend, WorkerConfig, WorkerRegistry, WorkflowConfig};
use crate::handlers::{RuleHandler, TaskHandler};
use crate::retry::{run_attempts, RetryPolicy};
use async_trait::async_trait;
use autosentry_core::{AutosentryError, Task, TaskKind, TaskResult, WorkerInfo, WorkerKind};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Self-contained default backend.
///
/// Runs every task in-process through a [`TaskHandler`] chosen by task kind.
/// The built-in rule tables are used unless a handler is overridden with
/// [`BuiltinBackend::with_handler`].
pub struct BuiltinBackend {
    registry: WorkerRegistry,
    handlers: RwLock<HashMap<TaskKind, Arc<dyn TaskHandler>>>,
    default_handler: Arc<dyn TaskHandler>,
    retry: RetryPolicy,
    initialized: AtomicBool,
}

impl BuiltinBackend {
    pub fn new() -> Self {
        Self {
            registry: WorkerRegistry::new(),
            handlers: RwLock::new(HashMap::new()),
            default_handler: Arc::new(RuleHandler),
            retry: RetryPolicy::default(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Replace the handler used for one task kind.
    pub fn with_handler(self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.write().insert(kind, handler);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn handler_for(&self, kind: TaskKind) -> Arc<dyn TaskHandler> {
        self.handlers
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.default_handler.clone())
    }
}

impl Default for BuiltinBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentBackend for BuiltinBackend {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn initialize(&self) -> bool {
        info!("Initializing built-in agent backend");
        self.initialized.store(true, Ordering::SeqCst);
        true
    }

    fn create_worker(&self, kind: WorkerKind, worker_id: &str, config: WorkerConfig) -> WorkerInfo {
        self.registry.register(kind, worker_id, config)
    }

    async fn execute_task(&self, worker_id: &str, task: &Task) -> TaskResult {
        if self.registry.get(worker_id).is_none() {
            return TaskResult::failure(
                &task.id,
                worker_id,
                &AutosentryError::WorkerNotFound(worker_id.to_string()),
            )
            .with_framework(self.name());
        }

        info!(worker_id, task_id = %task.id, kind = %task.kind, "Worker executing task");
        let started = Instant::now();
        let handler = self.handler_for(task.kind);
        let outcome = run_attempts(task, &self.retry, |attempt| {
            let handler = handler.clone();
            async move { handler.handle(&attempt).await }
        })
        .await;

        let result = match outcome.result {
            Ok(output) => TaskResult::success(&task.id, worker_id, output),
            Err(e) => {
                error!(worker_id, task_id = %task.id, error = %e, "Task failed");
                TaskResult::failure(&task.id, worker_id, &e)
            }
        };
        result
            .with_framework(self.name())
            .with_metadata("attempts", json!(outcome.attempts))
            .with_execution_time(started.elapsed())
    }

    fn route(&self, task: &Task, config: &WorkflowConfig) -> Option<String> {
        self.registry.route(task, config)
    }

    fn list_workers(&self) -> Vec<WorkerInfo> {
        self.registry.list()
    }

    async fn shutdown(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) || !self.registry.is_empty() {
            info!(workers = self.registry.len(), "Shutting down built-in agent backend");
        }
        self.registry.clear();
    }
}
