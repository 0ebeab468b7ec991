use autosentry_core::{TaskResult, WorkerKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Counters for one worker kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub tasks: u32,
    pub errors: u32,
    pub fallbacks: u32,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
    Error,
}

/// Real-time snapshot of one worker kind as seen by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub kind: WorkerKind,
    pub current_task: Option<String>,
    pub status: WorkerStatus,
    pub metrics: WorkerMetrics,
}

/// Tracks state and metrics for every worker kind the controller dispatches to.
pub struct WorkerMonitor {
    states: Arc<RwLock<HashMap<WorkerKind, WorkerState>>>,
}

impl WorkerMonitor {
    pub fn new() -> Self {
        let states = WorkerKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    WorkerState {
                        kind: *kind,
                        current_task: None,
                        status: WorkerStatus::Idle,
                        metrics: WorkerMetrics::default(),
                    },
                )
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Mark a worker kind as working on a task.
    pub async fn start_task(&self, kind: WorkerKind, task_id: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&kind) {
            state.current_task = Some(task_id.to_string());
            state.status = WorkerStatus::Working;
        }
    }

    /// Record a finished task. A failed result leaves the worker in `Error`.
    pub async fn finish_task(&self, kind: WorkerKind, result: &TaskResult) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&kind) {
            state.current_task = None;
            state.metrics.tasks += 1;
            state.metrics.duration_ms += result.execution_time_ms;
            if result.is_fallback() {
                state.metrics.fallbacks += 1;
            }
            if result.success {
                state.status = WorkerStatus::Idle;
            } else {
                state.metrics.errors += 1;
                state.status = WorkerStatus::Error;
            }
        }
    }

    /// Get a snapshot of all worker states, in roster order.
    pub async fn snapshot(&self) -> Vec<WorkerState> {
        let states = self.states.read().await;
        WorkerKind::ALL
            .iter()
            .filter_map(|kind| states.get(kind).cloned())
            .collect()
    }

    pub async fn get_state(&self, kind: WorkerKind) -> Option<WorkerState> {
        let states = self.states.read().await;
        states.get(&kind).cloned()
    }

    /// Aggregate metrics across all worker kinds.
    pub async fn aggregate_metrics(&self) -> WorkerMetrics {
        let states = self.states.read().await;
        let mut total = WorkerMetrics::default();
        for state in states.values() {
            total.tasks += state.metrics.tasks;
            total.errors += state.metrics.errors;
            total.fallbacks += state.metrics.fallbacks;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "workers": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for WorkerMonitor {
    fn default() -> Self {
        Self::new()
    }
}
