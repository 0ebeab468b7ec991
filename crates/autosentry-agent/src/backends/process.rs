use super::{excerpt, finish_external};
use crate::backend::{AgentBackend, WorkerConfig, WorkerRegistry, WorkflowConfig};
use crate::config::ProcessRuntimeConfig;
use crate::fallback::{fallback_result, FallbackReason};
use crate::retry::{run_attempts, RetryPolicy};
use async_trait::async_trait;
use autosentry_core::{
    AutosentryError, AutosentryResult, Payload, Task, TaskResult, WorkerInfo, WorkerKind,
};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Backend that runs each task through a local agent runtime executable.
///
/// The request `{"worker_id", "worker_kind", "task", "settings"}` is written
/// to the child's stdin as one JSON document. The last line of stdout that
/// parses as JSON must carry `{"output": {..}}`.
pub struct ProcessBackend {
    config: ProcessRuntimeConfig,
    registry: WorkerRegistry,
    pool: Arc<Semaphore>,
    retry: RetryPolicy,
    program: RwLock<Option<PathBuf>>,
}

impl ProcessBackend {
    pub fn new(config: ProcessRuntimeConfig, pool_size: usize) -> Self {
        Self {
            config,
            registry: WorkerRegistry::new(),
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            retry: RetryPolicy::default(),
            program: RwLock::new(None),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Resolved executable, once `initialize` has found it.
    pub fn program(&self) -> Option<PathBuf> {
        self.program.read().clone()
    }

    async fn call(
        &self,
        program: &Path,
        worker_id: &str,
        worker_kind: WorkerKind,
        settings: &Payload,
        task: &Task,
    ) -> AutosentryResult<Payload> {
        let request = serde_json::to_vec(&json!({
            "worker_id": worker_id,
            "worker_kind": worker_kind,
            "task": task,
            "settings": settings,
        }))?;

        let mut child = tokio::process::Command::new(program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AutosentryError::Execution(format!(
                    "Failed to start agent runtime '{}': {e}",
                    program.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request).await?;
            stdin.shutdown().await?;
        }

        let output = if self.config.timeout_secs == 0 {
            child.wait_with_output().await?
        } else {
            let limit = Duration::from_secs(self.config.timeout_secs);
            match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => return Err(AutosentryError::Timeout(self.config.timeout_secs)),
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutosentryError::Execution(format!(
                "Agent runtime failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                excerpt(&stderr)
            )));
        }

        let response: Value = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str(line).ok())
            .ok_or_else(|| {
                AutosentryError::Execution(format!(
                    "Could not parse agent runtime output as JSON. stdout: {}",
                    excerpt(&stdout)
                ))
            })?;

        match response.get("output") {
            Some(Value::Object(output)) => Ok(output.clone()),
            _ => Err(AutosentryError::Execution(
                "Agent runtime response has no 'output' object".into(),
            )),
        }
    }
}

/// Resolve `command` to an existing file, searching `PATH` for bare names.
fn locate(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|path| path.is_file())
}

#[async_trait]
impl AgentBackend for ProcessBackend {
    fn name(&self) -> &str {
        "process"
    }

    async fn initialize(&self) -> bool {
        let found = locate(&self.config.command);
        match &found {
            Some(path) => info!(program = %path.display(), "Found agent runtime executable"),
            None => warn!(
                command = %self.config.command,
                "Agent runtime executable not found, tasks will use fallback execution"
            ),
        }
        let available = found.is_some();
        *self.program.write() = found;
        available
    }

    fn create_worker(&self, kind: WorkerKind, worker_id: &str, config: WorkerConfig) -> WorkerInfo {
        self.registry.register(kind, worker_id, config)
    }

    async fn execute_task(&self, worker_id: &str, task: &Task) -> TaskResult {
        let Some(registration) = self.registry.get(worker_id) else {
            return TaskResult::failure(
                &task.id,
                worker_id,
                &AutosentryError::WorkerNotFound(worker_id.to_string()),
            )
            .with_framework(self.name());
        };
        let kind = registration.info.worker_kind;
        let started = Instant::now();

        let Some(program) = self.program() else {
            return fallback_result(
                self.name(),
                worker_id,
                kind,
                task,
                FallbackReason::Unavailable,
                started,
            );
        };
        let Ok(_permit) = self.pool.acquire().await else {
            return fallback_result(
                self.name(),
                worker_id,
                kind,
                task,
                FallbackReason::Unavailable,
                started,
            );
        };

        info!(worker_id, task_id = %task.id, kind = %task.kind, "Spawning agent runtime for task");
        let program = program.as_path();
        let settings = &registration.config.settings;
        let outcome = run_attempts(task, &self.retry, |attempt| async move {
            self.call(program, worker_id, kind, settings, &attempt).await
        })
        .await;

        finish_external(self.name(), worker_id, kind, task, outcome, started)
    }

    fn route(&self, task: &Task, config: &WorkflowConfig) -> Option<String> {
        self.registry.route(task, config)
    }

    fn list_workers(&self) -> Vec<WorkerInfo> {
        self.registry.list()
    }

    async fn shutdown(&self) {
        if self.program.write().take().is_some() {
            info!("Released agent runtime executable");
        }
        self.registry.clear();
    }
}
