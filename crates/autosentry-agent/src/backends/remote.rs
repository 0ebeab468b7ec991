use super::{excerpt, finish_external};
use crate::backend::{AgentBackend, WorkerConfig, WorkerRegistry, WorkflowConfig};
use crate::config::RemoteRuntimeConfig;
use crate::fallback::{fallback_result, FallbackReason};
use crate::retry::{run_attempts, RetryPolicy};
use async_trait::async_trait;
use autosentry_core::{
    AutosentryError, AutosentryResult, Payload, Task, TaskResult, WorkerInfo, WorkerKind,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Backend that delegates task execution to an HTTP agent runtime.
///
/// Protocol:
/// - `GET {base_url}/health` during `initialize`
/// - `POST {base_url}/agents/{worker_id}/tasks` with `{"task": .., "worker_kind": .., "settings": ..}`,
///   answered by `{"output": {..}}`
///
/// Concurrent calls are bounded by a semaphore of `pool_size` permits.
pub struct RemoteBackend {
    config: RemoteRuntimeConfig,
    http: reqwest::Client,
    registry: WorkerRegistry,
    pool: Arc<Semaphore>,
    retry: RetryPolicy,
    available: AtomicBool,
}

impl RemoteBackend {
    pub fn new(config: RemoteRuntimeConfig, pool_size: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            config,
            http,
            registry: WorkerRegistry::new(),
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            retry: RetryPolicy::default(),
            available: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Whether the last `initialize` reached the runtime.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn base_url(&self) -> Option<&str> {
        self.config
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }

    async fn call(
        &self,
        base_url: &str,
        worker_id: &str,
        worker_kind: WorkerKind,
        settings: &Payload,
        task: &Task,
    ) -> AutosentryResult<Payload> {
        let url = format!("{base_url}/agents/{worker_id}/tasks");
        let body = json!({
            "task": task,
            "worker_kind": worker_kind,
            "settings": settings,
        });

        let resp = self
            .authorize(self.http.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| AutosentryError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AutosentryError::Http(format!(
                "Agent runtime returned {status}: {}",
                excerpt(&text)
            )));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| AutosentryError::Http(e.to_string()))?;
        match value.get("output") {
            Some(Value::Object(output)) => Ok(output.clone()),
            _ => Err(AutosentryError::Execution(
                "Agent runtime response has no 'output' object".into(),
            )),
        }
    }
}

#[async_trait]
impl AgentBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn initialize(&self) -> bool {
        let Some(base_url) = self.base_url() else {
            warn!("No remote agent runtime configured, tasks will use fallback execution");
            self.available.store(false, Ordering::SeqCst);
            return false;
        };

        let healthy = match self
            .authorize(self.http.get(format!("{base_url}/health")))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(url = base_url, status = %resp.status(), "Agent runtime health check failed");
                false
            }
            Err(e) => {
                warn!(url = base_url, error = %e, "Agent runtime unreachable");
                false
            }
        };
        if healthy {
            info!(url = base_url, "Connected to remote agent runtime");
        }
        self.available.store(healthy, Ordering::SeqCst);
        healthy
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

        let base_url = match self.base_url() {
            Some(url) if self.is_available() => url,
            _ => {
                return fallback_result(
                    self.name(),
                    worker_id,
                    kind,
                    task,
                    FallbackReason::Unavailable,
                    started,
                )
            }
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

        info!(worker_id, task_id = %task.id, kind = %task.kind, "Dispatching task to remote runtime");
        let settings = &registration.config.settings;
        let outcome = run_attempts(task, &self.retry, |attempt| async move {
            self.call(base_url, worker_id, kind, settings, &attempt).await
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
        if self.available.swap(false, Ordering::SeqCst) {
            info!("Disconnected from remote agent runtime");
        }
        self.registry.clear();
    }
}
