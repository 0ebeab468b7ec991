use autosentry_core::{AutosentryError, AutosentryResult, Payload, Task};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Backoff between retry attempts of a single task.
///
/// The number of attempts comes from the task itself (`max_retries`); the
/// policy only decides how long to wait between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without waiting.
    pub fn immediate() -> Self {
        Self {
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }
}

/// Exponential backoff for the given attempt, capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Final outcome of running a task through its retry budget.
#[derive(Debug)]
pub struct AttemptOutcome {
    pub result: AutosentryResult<Payload>,
    /// Number of attempts made, including the first.
    pub attempts: u32,
}

/// Run `attempt_fn` on successive private copies of `task` until it succeeds,
/// fails with a non-retryable error, or the task's retry budget is spent.
///
/// Each attempt is abandoned once it exceeds the task's `timeout_secs`
/// (0 disables the limit) and reported as [`AutosentryError::Timeout`].
pub async fn run_attempts<F, Fut>(task: &Task, policy: &RetryPolicy, mut attempt_fn: F) -> AttemptOutcome
where
    F: FnMut(Task) -> Fut,
    Fut: Future<Output = AutosentryResult<Payload>>,
{
    let mut attempt = task.clone();
    loop {
        let pending = attempt_fn(attempt.clone());
        let outcome = if attempt.timeout_secs == 0 {
            pending.await
        } else {
            match tokio::time::timeout(attempt.timeout(), pending).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AutosentryError::Timeout(attempt.timeout_secs)),
            }
        };

        match outcome {
            Ok(output) => {
                return AttemptOutcome {
                    result: Ok(output),
                    attempts: attempt.retry_count + 1,
                }
            }
            Err(e) if e.is_retryable() && attempt.can_retry() => {
                let delay = compute_backoff(policy, attempt.retry_count);
                info!(
                    task_id = %task.id,
                    attempt = attempt.retry_count,
                    delay_ms = delay,
                    error = %e,
                    "Retryable task failure, backing off"
                );
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                attempt = attempt.next_attempt();
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(task_id = %task.id, attempts = attempt.retry_count + 1, error = %e, "Retry budget exhausted");
                }
                return AttemptOutcome {
                    result: Err(e),
                    attempts: attempt.retry_count + 1,
                };
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use autosentry_core::TaskKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_computation() {
        let policy = RetryPolicy {
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        };
        assert_eq!(compute_backoff(&policy, 0), 500);
        assert_eq!(compute_backoff(&policy, 1), 1000);
        assert_eq!(compute_backoff(&policy, 3), 4000);
        assert_eq!(compute_backoff(&policy, 6), 30_000);
        assert_eq!(compute_backoff(&RetryPolicy::immediate(), 4), 0);
    }

    #[tokio::test]
    async fn retry_succeeds_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let task = Task::new("t", TaskKind::Analyze, "flaky");
        let outcome = run_attempts(&task, &RetryPolicy::immediate(), |attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AutosentryError::Execution("transient".into()))
                } else {
                    let mut out = Payload::new();
                    out.insert("retry_count".into(), attempt.retry_count.into());
                    Ok(out)
                }
            }
        })
        .await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.unwrap()["retry_count"], 1);
    }

    #[tokio::test]
    async fn validation_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let task = Task::new("t", TaskKind::Diagnose, "bad input");
        let outcome = run_attempts(&task, &RetryPolicy::immediate(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AutosentryError::Validation("missing analysis".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(AutosentryError::Validation(_))));
    }

    #[tokio::test]
    async fn retries_stop_at_max_retries() {
        let calls = AtomicU32::new(0);
        let task = Task::new("t", TaskKind::Schedule, "always fails").with_max_retries(2);
        let outcome = run_attempts(&task, &RetryPolicy::immediate(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AutosentryError::Execution("down".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let task = Task::new("t", TaskKind::Engage, "slow")
            .with_timeout_secs(1)
            .with_max_retries(0);
        let outcome = run_attempts(&task, &RetryPolicy::immediate(), |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Payload::new())
        })
        .await;
        assert!(matches!(outcome.result, Err(AutosentryError::Timeout(1))));
    }
}
