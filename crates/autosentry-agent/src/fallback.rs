use crate::handlers::{builtin_output, short_id};
use autosentry_core::{Payload, Task, TaskResult, WorkerKind};
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, warn};

/// Why an alternate backend took its fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The runtime was never reachable (`initialize` returned false).
    Unavailable,
    /// The runtime call failed after the task's retries.
    CallFailed,
    /// The runtime call exceeded the task timeout.
    TimedOut,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::Unavailable => "runtime_unavailable",
            FallbackReason::CallFailed => "runtime_error",
            FallbackReason::TimedOut => "runtime_timeout",
        }
    }
}

/// Minimal per-kind payload used when even the built-in rule table rejects
/// the task input.
fn canned_output(kind: WorkerKind) -> Payload {
    let value = match kind {
        WorkerKind::DataAnalysis => json!({
            "analysis": "Data analysis complete",
            "patterns_detected": ["normal_operation"],
            "anomalies": []
        }),
        WorkerKind::Diagnosis => json!({
            "diagnosis": "No critical issues found",
            "severity": "low",
            "recommendations": ["Continue regular maintenance"]
        }),
        WorkerKind::CustomerEngagement => json!({
            "engagement_id": short_id("ENG"),
            "message": "Your vehicle is being monitored by AutoSentry.",
            "channel": "chat"
        }),
        WorkerKind::Scheduling => json!({
            "appointment_id": short_id("APT"),
            "status": "available"
        }),
        WorkerKind::Feedback => json!({
            "survey_sent": true,
            "feedback_id": short_id("FB")
        }),
        WorkerKind::RcaCapa => json!({
            "rca_complete": true,
            "capa_id": short_id("CAPA")
        }),
        WorkerKind::Master => json!({ "status": "completed" }),
    };
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/// Synthesize a successful substitute result for an alternate backend.
///
/// The output comes from the built-in rule table for the task kind, or the
/// canned payload for the worker kind when the input does not satisfy it.
/// `metadata.framework` is `<framework>_fallback`.
pub fn fallback_result(
    framework: &str,
    worker_id: &str,
    worker_kind: WorkerKind,
    task: &Task,
    reason: FallbackReason,
    started: Instant,
) -> TaskResult {
    let tag = format!("{framework}_fallback");
    warn!(
        task_id = %task.id,
        worker_id,
        framework = %tag,
        reason = reason.as_str(),
        "Using fallback execution"
    );

    let mut output = match builtin_output(task) {
        Ok(output) => output,
        Err(e) => {
            debug!(task_id = %task.id, error = %e, "Built-in rules rejected input, using canned output");
            canned_output(worker_kind)
        }
    };
    output.insert("task_id".into(), json!(task.id));
    output.insert("task_type".into(), json!(task.kind.as_str()));
    output.insert("agent_type".into(), json!(worker_kind.as_str()));
    output.insert("framework".into(), json!(tag));
    output.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));

    TaskResult::success(&task.id, worker_id, output)
        .with_framework(tag)
        .with_metadata("fallback_reason", json!(reason.as_str()))
        .with_execution_time(started.elapsed())
}
