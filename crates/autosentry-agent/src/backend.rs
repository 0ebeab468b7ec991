use async_trait::async_trait;
use autosentry_core::{AutosentryError, Payload, Task, TaskResult, WorkerInfo, WorkerKind};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

/// Per-worker configuration passed to [`AgentBackend::create_worker`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Names of tools the worker may use.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Backend-specific settings, forwarded verbatim to external runtimes.
    #[serde(default)]
    pub settings: Payload,
}

fn default_chain_outputs() -> bool {
    true
}

/// Options for [`AgentBackend::run_workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Task kind name → worker id, overriding the default routing.
    #[serde(default)]
    pub agent_mapping: HashMap<String, String>,
    /// Feed each successful output into later tasks as `<kind>_result`.
    #[serde(default = "default_chain_outputs")]
    pub chain_outputs: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            agent_mapping: HashMap::new(),
            chain_outputs: true,
        }
    }
}

/// The capability contract every backend variant implements.
///
/// `execute_task` and `run_workflow` never return errors: anything that goes
/// wrong inside a backend comes back as a failed [`TaskResult`], so callers can
/// treat every variant the same way regardless of what runs underneath.
///
/// To add a new variant:
/// 1. Create a module in `backends/`
/// 2. Implement `AgentBackend` for your struct
/// 3. Add the variant to `BackendKind` in `config.rs` and wire it in `create_backend`
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Identifier recorded as `metadata.framework` on results.
    fn name(&self) -> &str;

    /// Perform setup. Returns `false` (never panics) when the variant's
    /// runtime is unavailable; the backend stays usable in degraded mode.
    async fn initialize(&self) -> bool;

    /// Register a worker. Re-registering an id replaces the previous entry.
    fn create_worker(&self, kind: WorkerKind, worker_id: &str, config: WorkerConfig) -> WorkerInfo;

    /// Execute one task on the named worker.
    async fn execute_task(&self, worker_id: &str, task: &Task) -> TaskResult;

    /// Pick the worker for a task, honoring `config.agent_mapping`.
    fn route(&self, task: &Task, config: &WorkflowConfig) -> Option<String>;

    /// All registered workers in registration order.
    fn list_workers(&self) -> Vec<WorkerInfo>;

    /// Look up a worker by id.
    fn get_worker(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.list_workers()
            .into_iter()
            .find(|w| w.worker_id == worker_id)
    }

    /// Execute a batch in priority order and return one result per task,
    /// aligned with the input order.
    async fn run_workflow(&self, tasks: &[Task], config: &WorkflowConfig) -> Vec<TaskResult> {
        let mut slots: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        let mut chained = Payload::new();

        for idx in priority_order(tasks) {
            let mut task = tasks[idx].clone();
            if config.chain_outputs {
                for (key, value) in &chained {
                    task.input.insert(key.clone(), value.clone());
                }
            }

            let result = match self.route(&task, config) {
                Some(worker_id) => {
                    debug!(task_id = %task.id, worker_id = %worker_id, "Dispatching workflow task");
                    self.execute_task(&worker_id, &task).await
                }
                None => TaskResult::failure(
                    &task.id,
                    "none",
                    &AutosentryError::NoSuitableWorker(task.kind.to_string()),
                )
                .with_framework(self.name()),
            };

            if result.success && config.chain_outputs {
                chained.insert(
                    format!("{}_result", task.kind),
                    Value::Object(result.output.clone()),
                );
            }
            slots[idx] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }

    /// Release resources. Safe to call more than once.
    async fn shutdown(&self);
}

/// Indices of `tasks` in execution order: ascending priority, ties keep input order.
pub fn priority_order(tasks: &[Task]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tasks.len()).collect();
    // sort_by_key is stable
    order.sort_by_key(|&i| tasks[i].priority);
    order
}

/// A worker entry held by a backend.
#[derive(Debug, Clone)]
pub struct Registration {
    pub info: WorkerInfo,
    pub config: WorkerConfig,
}

/// Worker table owned by one backend instance.
///
/// Written only by `create_worker`/`shutdown`; task execution only reads it.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<Vec<Registration>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a worker, keeping its original position when replaced.
    pub fn register(&self, kind: WorkerKind, worker_id: &str, config: WorkerConfig) -> WorkerInfo {
        let info = WorkerInfo {
            worker_id: worker_id.to_string(),
            worker_kind: kind,
        };
        let entry = Registration {
            info: info.clone(),
            config,
        };
        let mut workers = self.workers.write();
        match workers.iter_mut().find(|r| r.info.worker_id == worker_id) {
            Some(existing) => {
                info!(worker_id, kind = %kind, "Replaced worker registration");
                *existing = entry;
            }
            None => {
                info!(worker_id, kind = %kind, "Registered worker");
                workers.push(entry);
            }
        }
        info
    }

    pub fn get(&self, worker_id: &str) -> Option<Registration> {
        self.workers
            .read()
            .iter()
            .find(|r| r.info.worker_id == worker_id)
            .cloned()
    }

    /// Id of the first worker registered with `kind`.
    pub fn first_of_kind(&self, kind: WorkerKind) -> Option<String> {
        self.workers
            .read()
            .iter()
            .find(|r| r.info.worker_kind == kind)
            .map(|r| r.info.worker_id.clone())
    }

    /// Default routing: explicit mapping, then the task kind's worker kind,
    /// then the first master worker.
    pub fn route(&self, task: &Task, config: &WorkflowConfig) -> Option<String> {
        if let Some(worker_id) = config.agent_mapping.get(task.kind.as_str()) {
            return Some(worker_id.clone());
        }
        task.kind
            .preferred_worker()
            .and_then(|kind| self.first_of_kind(kind))
            .or_else(|| self.first_of_kind(WorkerKind::Master))
    }

    pub fn list(&self) -> Vec<WorkerInfo> {
        self.workers.read().iter().map(|r| r.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    pub fn clear(&self) {
        self.workers.write().clear();
    }
}
