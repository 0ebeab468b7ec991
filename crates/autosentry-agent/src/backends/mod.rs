//! Backend variants.
//!
//! `builtin` runs everything in-process. `remote` and `process` delegate to
//! an external agent runtime and substitute a fallback result whenever that
//! runtime is unavailable, errors, or times out.

pub mod builtin;
pub mod process;
pub mod remote;

use crate::fallback::{fallback_result, FallbackReason};
use crate::retry::AttemptOutcome;
use autosentry_core::{AutosentryError, Task, TaskResult, WorkerKind};
use serde_json::json;
use std::time::Instant;
use tracing::warn;

/// Longest runtime output quoted in an error message, in characters.
const EXCERPT_CHARS: usize = 500;

/// Leading part of runtime output for error messages, cut on a char boundary.
pub(crate) fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Turn the outcome of an external runtime call into a result.
///
/// Failures never escape: timeouts and call errors become fallback results.
pub(crate) fn finish_external(
    framework: &str,
    worker_id: &str,
    worker_kind: WorkerKind,
    task: &Task,
    outcome: AttemptOutcome,
    started: Instant,
) -> TaskResult {
    let attempts = json!(outcome.attempts);
    match outcome.result {
        Ok(output) => TaskResult::success(&task.id, worker_id, output)
            .with_framework(framework)
            .with_metadata("attempts", attempts)
            .with_execution_time(started.elapsed()),
        Err(e) => {
            warn!(framework, worker_id, task_id = %task.id, error = %e, "Runtime call failed, using fallback");
            let reason = match &e {
                AutosentryError::Timeout(_) => FallbackReason::TimedOut,
                _ => FallbackReason::CallFailed,
            };
            fallback_result(framework, worker_id, worker_kind, task, reason, started)
                .with_metadata("attempts", attempts)
                .with_metadata("runtime_error", json!(e.to_string()))
        }
    }
}
