use crate::error::AutosentryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;

/// Free-form JSON object carried as task input, result output and metadata.
pub type Payload = Map<String, Value>;

/// Logical kind of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Catch-all worker that receives tasks nobody else is registered for.
    Master,
    /// Telemetry analysis.
    DataAnalysis,
    /// Fault diagnosis from analysis and prediction output.
    Diagnosis,
    /// Customer notification.
    CustomerEngagement,
    /// Service appointment booking.
    Scheduling,
    /// Post-service feedback collection.
    Feedback,
    /// Root cause analysis and corrective/preventive actions.
    RcaCapa,
}

impl WorkerKind {
    /// All worker kinds, master first.
    pub const ALL: [WorkerKind; 7] = [
        WorkerKind::Master,
        WorkerKind::DataAnalysis,
        WorkerKind::Diagnosis,
        WorkerKind::CustomerEngagement,
        WorkerKind::Scheduling,
        WorkerKind::Feedback,
        WorkerKind::RcaCapa,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Master => "master",
            WorkerKind::DataAnalysis => "data_analysis",
            WorkerKind::Diagnosis => "diagnosis",
            WorkerKind::CustomerEngagement => "customer_engagement",
            WorkerKind::Scheduling => "scheduling",
            WorkerKind::Feedback => "feedback",
            WorkerKind::RcaCapa => "rca_capa",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = AutosentryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AutosentryError::Config(format!("unknown worker kind: {s}")))
    }
}

/// Kind of work a [`Task`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Analyze,
    Diagnose,
    Predict,
    Schedule,
    Engage,
    Feedback,
    RcaCapa,
    /// Anything without a dedicated worker kind; routed to the master worker.
    #[serde(other)]
    Generic,
}

impl TaskKind {
    /// Stable snake_case name, also used as the `<kind>_result` chaining prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Analyze => "analyze",
            TaskKind::Diagnose => "diagnose",
            TaskKind::Predict => "predict",
            TaskKind::Schedule => "schedule",
            TaskKind::Engage => "engage",
            TaskKind::Feedback => "feedback",
            TaskKind::RcaCapa => "rca_capa",
            TaskKind::Generic => "generic",
        }
    }

    /// The worker kind this task is routed to by default.
    pub fn preferred_worker(&self) -> Option<WorkerKind> {
        match self {
            TaskKind::Analyze | TaskKind::Predict => Some(WorkerKind::DataAnalysis),
            TaskKind::Diagnose => Some(WorkerKind::Diagnosis),
            TaskKind::Schedule => Some(WorkerKind::Scheduling),
            TaskKind::Engage => Some(WorkerKind::CustomerEngagement),
            TaskKind::Feedback => Some(WorkerKind::Feedback),
            TaskKind::RcaCapa => Some(WorkerKind::RcaCapa),
            TaskKind::Generic => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = std::convert::Infallible;

    /// Unknown names parse as [`TaskKind::Generic`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "analyze" => TaskKind::Analyze,
            "diagnose" => TaskKind::Diagnose,
            "predict" => TaskKind::Predict,
            "schedule" => TaskKind::Schedule,
            "engage" => TaskKind::Engage,
            "feedback" => TaskKind::Feedback,
            "rca_capa" => TaskKind::RcaCapa,
            _ => TaskKind::Generic,
        })
    }
}

fn default_priority() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// A unit of work dispatched to a worker.
///
/// Only `retry_count` changes after creation, and only on the private copy
/// made for each retry attempt (see [`Task::next_attempt`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub description: String,
    #[serde(default)]
    pub input: Payload,
    /// 1 is the highest priority; lower values execute first.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: TaskKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            input: Payload::new(),
            priority: default_priority(),
            timeout_secs: default_timeout_secs(),
            retry_count: 0,
            max_retries: default_max_retries(),
        }
    }

    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    /// Add or replace a single input key.
    pub fn with_input_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether another attempt is allowed after the current one.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// A private copy for the next attempt, with `retry_count` incremented.
    pub fn next_attempt(&self) -> Task {
        let mut next = self.clone();
        next.retry_count += 1;
        next
    }

    /// The input object under `key`, or an empty object when absent or not an object.
    pub fn input_object(&self, key: &str) -> Payload {
        self.input
            .get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

/// The outcome of one executed task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub worker_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: Payload,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: f64,
    /// `framework` names the backend variant (suffixed `_fallback` when the
    /// fallback path produced the output); `error_kind` classifies failures.
    #[serde(default)]
    pub metadata: Payload,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// A successful result.
    pub fn success(task_id: impl Into<String>, worker_id: impl Into<String>, output: Payload) -> Self {
        Self {
            task_id: task_id.into(),
            worker_id: worker_id.into(),
            success: true,
            output,
            error: None,
            execution_time_ms: 0.0,
            metadata: Payload::new(),
            completed_at: Utc::now(),
        }
    }

    /// A failed result carrying the error message and its taxonomy kind.
    pub fn failure(
        task_id: impl Into<String>,
        worker_id: impl Into<String>,
        err: &AutosentryError,
    ) -> Self {
        let mut metadata = Payload::new();
        metadata.insert("error_kind".into(), Value::from(err.kind().as_str()));
        Self {
            task_id: task_id.into(),
            worker_id: worker_id.into(),
            success: false,
            output: Payload::new(),
            error: Some(err.to_string()),
            execution_time_ms: 0.0,
            metadata,
            completed_at: Utc::now(),
        }
    }

    pub fn with_framework(self, framework: impl Into<String>) -> Self {
        self.with_metadata("framework", Value::String(framework.into()))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time_ms = elapsed.as_secs_f64() * 1000.0;
        self
    }

    /// The backend variant that produced this result.
    pub fn framework(&self) -> Option<&str> {
        self.metadata.get("framework").and_then(Value::as_str)
    }

    /// Whether a backend's fallback path produced this result.
    pub fn is_fallback(&self) -> bool {
        self.framework().is_some_and(|f| f.ends_with("_fallback"))
    }

    /// A string field of the output.
    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.output.get(key).and_then(Value::as_str)
    }
}

/// Public view of a worker registered with a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub worker_kind: WorkerKind,
}
