//! Integration tests for autosentry-core: task lifecycle and result construction.

use autosentry_core::*;
use serde_json::json;

#[test]
fn test_retry_chain_respects_budget() {
    let task = Task::new("WF-1-diagnosis", TaskKind::Diagnose, "Diagnose").with_max_retries(2);
    let mut attempt = task.clone();
    let mut attempts = 1;
    while attempt.can_retry() {
        attempt = attempt.next_attempt();
        attempts += 1;
    }
    assert_eq!(attempts, 3);
    assert_eq!(attempt.retry_count, 2);
    assert_eq!(task.retry_count, 0);
}

#[test]
fn test_result_serialization_keeps_metadata() {
    let mut output = Payload::new();
    output.insert("overall_status".into(), json!("healthy"));
    let result = TaskResult::success("t-1", "data-analysis-001", output)
        .with_framework("builtin")
        .with_metadata("attempts", json!(1));

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["metadata"]["framework"], "builtin");
    assert_eq!(value["output"]["overall_status"], "healthy");

    let parsed: TaskResult = serde_json::from_value(value).unwrap();
    assert_eq!(parsed.framework(), Some("builtin"));
    assert_eq!(parsed.output_str("overall_status"), Some("healthy"));
}

#[test]
fn test_no_suitable_worker_is_worker_not_found_kind() {
    let err = AutosentryError::NoSuitableWorker("feedback".into());
    assert_eq!(err.kind(), ErrorKind::WorkerNotFound);
    assert!(err.to_string().contains("No suitable worker"));
    let result = TaskResult::failure("t", "none", &err);
    assert_eq!(result.worker_id, "none");
    assert!(!result.error.unwrap_or_default().is_empty());
}
