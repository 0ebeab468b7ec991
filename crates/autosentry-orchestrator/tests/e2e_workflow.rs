//! End-to-end workflow tests.
//!
//! Drives `MasterController::process_telemetry` through the built-in and
//! fallback backends, with collaborators served by wiremock or in-process stubs.
//! Checks conditional stage entry, severity gating, collaborator degradation,
//! and concurrent runs.

use async_trait::async_trait;
use autosentry_agent::BuiltinBackend;
use autosentry_core::{AutosentryResult, Payload};
use autosentry_orchestrator::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Stub collaborators
// ---------------------------------------------------------------------------

struct FixedPrediction(f64);

#[async_trait]
impl PredictionService for FixedPrediction {
    async fn predict(&self, _telemetry: &Payload) -> AutosentryResult<Payload> {
        let mut out = Payload::new();
        out.insert("failure_probability".into(), json!(self.0));
        out.insert("confidence".into(), json!(0.9));
        Ok(out)
    }
}

#[derive(Default)]
struct RecordingScorer {
    actions: Mutex<Vec<AgentAction>>,
}

#[async_trait]
impl BehaviorScorer for RecordingScorer {
    async fn score(&self, action: &AgentAction) -> AutosentryResult<BehaviorReport> {
        self.actions.lock().push(action.clone());
        Ok(BehaviorReport {
            alert: action.action_type == "schedule",
            score: 0.2,
            details: Payload::new(),
        })
    }
}

fn stub_controller(
    probability: f64,
    config: ControllerConfig,
) -> (MasterController, Arc<RecordingScorer>) {
    let scorer = Arc::new(RecordingScorer::default());
    let controller = MasterController::with_components(
        config,
        Arc::new(BuiltinBackend::new()),
        Arc::new(FixedPrediction(probability)),
        scorer.clone(),
    );
    (controller, scorer)
}

fn critical_telemetry() -> Value {
    json!({
        "vehicle_id": "VH001",
        "engine_temp": 118.5,
        "oil_pressure": 26.2,
        "battery_voltage": 10.5,
        "brake_pad_wear_avg": 0.08
    })
}

fn healthy_telemetry(vehicle_id: &str) -> Value {
    json!({
        "vehicle_id": vehicle_id,
        "engine_temp": 92.0,
        "oil_pressure": 45.0,
        "battery_voltage": 12.6,
        "brake_pad_wear_avg": 0.6
    })
}

fn output_str<'a>(summary: &'a RunSummary, stage_name: &str, key: &str) -> Option<&'a str> {
    summary
        .stage_output(stage_name)
        .and_then(|out| out.get(key))
        .and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Full pipeline over HTTP collaborators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_critical_telemetry_runs_every_stage() {
    let ml = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"failure_probability": 0.87, "confidence": 0.93, "predicted_failure": "brake_system"}),
        ))
        .expect(1)
        .mount(&ml)
        .await;
    let ueba = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"alert": false, "score": 0.12})),
        )
        .expect(2)
        .mount(&ueba)
        .await;

    let config = ControllerConfig {
        prediction_url: ml.uri(),
        behavior_url: ueba.uri(),
        ..ControllerConfig::default()
    };
    let controller = MasterController::new(config);
    assert!(controller.initialize().await);

    let summary = controller.process_telemetry(&critical_telemetry()).await;

    assert_eq!(summary.status, RunStatus::Completed, "{:?}", summary.error);
    assert_eq!(summary.subject_id, "VH001");
    assert!(summary.requires_action);
    assert_eq!(
        output_str(&summary, stage::ANALYSIS, "overall_status"),
        Some("needs_attention")
    );
    let severity = output_str(&summary, stage::DIAGNOSIS, "severity").unwrap();
    assert!(["high", "critical"].contains(&severity));
    assert!(output_str(&summary, stage::ENGAGEMENT, "engagement_id")
        .unwrap()
        .starts_with("ENG-"));
    assert!(output_str(&summary, stage::SCHEDULING, "appointment_id")
        .unwrap()
        .starts_with("APT-"));
    assert_eq!(
        summary.stage_output(stage::PREDICTION).unwrap()["predicted_failure"],
        "brake_system"
    );
    assert!(summary.has_stage(stage::BEHAVIOR_CHECK));
    assert!(summary.has_stage(stage::SCHEDULING_BEHAVIOR_CHECK));
    assert!(summary.stages.values().all(StageOutcome::succeeded));

    let metrics = controller.monitor().aggregate_metrics().await;
    assert_eq!(metrics.tasks, 4);
    assert_eq!(metrics.errors, 0);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_collaborator_server_errors_do_not_fail_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = ControllerConfig {
        prediction_url: server.uri(),
        behavior_url: server.uri(),
        ..ControllerConfig::default()
    };
    let controller = MasterController::new(config);
    controller.initialize().await;

    let summary = controller.process_telemetry(&critical_telemetry()).await;
    assert_eq!(summary.status, RunStatus::Completed);
    assert!(summary.requires_action);

    let prediction = summary.stage(stage::PREDICTION).unwrap();
    assert!(!prediction.succeeded());
    assert!(prediction.output().is_empty());

    let check = summary.stage_output(stage::BEHAVIOR_CHECK).unwrap();
    assert_eq!(check["alert"], false);
    assert_eq!(check["score"], 0.0);
    assert!(summary.has_stage(stage::SCHEDULING));
}

#[tokio::test]
async fn test_slow_collaborators_time_out_to_neutral_values() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"failure_probability": 0.99, "alert": true, "score": 1.0}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = ControllerConfig {
        prediction_url: server.uri(),
        behavior_url: server.uri(),
        collaborator_timeout_secs: 1,
        ..ControllerConfig::default()
    };
    let controller = MasterController::new(config);
    controller.initialize().await;

    let summary = controller
        .process_telemetry(&healthy_telemetry("VH002"))
        .await;
    assert_eq!(summary.status, RunStatus::Completed);
    assert!(!summary.requires_action);
    assert!(!summary.has_stage(stage::DIAGNOSIS));
    assert!(!summary.stage(stage::BEHAVIOR_CHECK).unwrap().succeeded());
}

// ---------------------------------------------------------------------------
// Conditional entry and gating
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_high_probability_enters_diagnosis_without_analysis_warning() {
    let (controller, _) = stub_controller(0.5, ControllerConfig::default());
    controller.initialize().await;

    let summary = controller
        .process_telemetry(&healthy_telemetry("VH003"))
        .await;
    assert_eq!(
        output_str(&summary, stage::ANALYSIS, "overall_status"),
        Some("healthy")
    );
    assert!(summary.has_stage(stage::DIAGNOSIS));
    assert!(summary.requires_action);
    // Healthy indicators diagnose as low severity: no service workflow.
    assert_eq!(output_str(&summary, stage::DIAGNOSIS, "severity"), Some("low"));
    assert!(!summary.has_stage(stage::ENGAGEMENT));
    assert!(!summary.has_stage(stage::SCHEDULING));
}

#[tokio::test]
async fn test_low_probability_and_healthy_analysis_skip_diagnosis() {
    let (controller, scorer) = stub_controller(0.1, ControllerConfig::default());
    controller.initialize().await;

    let summary = controller
        .process_telemetry(&healthy_telemetry("VH004"))
        .await;
    assert_eq!(summary.status, RunStatus::Completed);
    assert!(!summary.has_stage(stage::DIAGNOSIS));
    assert!(!summary.requires_action);
    assert_eq!(summary.stages.len(), 3);
    assert_eq!(scorer.actions.lock().len(), 1);
}

#[tokio::test]
async fn test_threshold_is_exclusive() {
    let (controller, _) = stub_controller(0.3, ControllerConfig::default());
    controller.initialize().await;
    let summary = controller
        .process_telemetry(&healthy_telemetry("VH005"))
        .await;
    assert!(!summary.has_stage(stage::DIAGNOSIS));
}

#[tokio::test]
async fn test_medium_severity_triggers_service_workflow() {
    let (controller, scorer) = stub_controller(0.0, ControllerConfig::default());
    controller.initialize().await;

    let telemetry = json!({"vehicle_id": "VH006", "battery_voltage": 10.9});
    let summary = controller.process_telemetry(&telemetry).await;
    assert_eq!(output_str(&summary, stage::DIAGNOSIS, "severity"), Some("medium"));
    assert!(summary.has_stage(stage::ENGAGEMENT));
    assert_eq!(
        output_str(&summary, stage::SCHEDULING, "service_type"),
        Some("Electrical Service")
    );

    let actions = scorer.actions.lock();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].agent_id, "master-001");
    assert_eq!(actions[0].action_type, "query");
    assert_eq!(actions[1].agent_id, "scheduling-001");
    assert_eq!(actions[1].target_entity, "appointment");
    assert_eq!(actions[1].subject_id, "VH006");
    // An alert is advisory only.
    assert_eq!(
        summary.stage_output(stage::SCHEDULING_BEHAVIOR_CHECK).unwrap()["alert"],
        true
    );
    assert_eq!(summary.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_configured_service_severities_gate_the_service_workflow() {
    let config = ControllerConfig {
        service_severities: vec!["critical".into()],
        ..ControllerConfig::default()
    };
    let (controller, _) = stub_controller(0.0, config);
    controller.initialize().await;

    let summary = controller.process_telemetry(&critical_telemetry()).await;
    assert_eq!(output_str(&summary, stage::DIAGNOSIS, "severity"), Some("high"));
    assert!(!summary.has_stage(stage::ENGAGEMENT));
    assert!(!summary.has_stage(stage::SCHEDULING));
    assert!(summary.requires_action);
}

#[tokio::test]
async fn test_customer_from_bundle_is_used_for_engagement() {
    let (controller, _) = stub_controller(0.0, ControllerConfig::default());
    controller.initialize().await;

    let mut telemetry = critical_telemetry();
    telemetry["customer"] = json!({"id": "CUST-77", "name": "Ada Lovelace", "phone": "+1-555-0199"});
    let summary = controller.process_telemetry(&telemetry).await;
    assert_eq!(
        output_str(&summary, stage::SCHEDULING, "customer_name"),
        Some("Ada Lovelace")
    );
}

// ---------------------------------------------------------------------------
// Backends and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unavailable_backend_still_completes_the_workflow() {
    let config = ControllerConfig {
        backend: "remote".into(),
        prediction_url: "http://127.0.0.1:9".into(),
        behavior_url: "http://127.0.0.1:9".into(),
        collaborator_timeout_secs: 2,
        ..ControllerConfig::default()
    };
    let controller = MasterController::new(config);
    assert!(!controller.initialize().await);
    assert_eq!(controller.list_workers().len(), 6);

    let summary = controller.process_telemetry(&critical_telemetry()).await;
    assert_eq!(summary.status, RunStatus::Completed);
    let analysis = summary
        .stage(stage::ANALYSIS)
        .and_then(StageOutcome::task_result)
        .unwrap();
    assert_eq!(analysis.framework(), Some("remote_fallback"));
    assert!(summary.has_stage(stage::SCHEDULING));

    let metrics = controller.monitor().aggregate_metrics().await;
    assert_eq!(metrics.fallbacks, metrics.tasks);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let (controller, _) = stub_controller(0.0, ControllerConfig::default());
    let controller = Arc::new(controller);
    controller.initialize().await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            let telemetry = if i % 2 == 0 {
                critical_telemetry()
            } else {
                healthy_telemetry(&format!("VH1{i:02}"))
            };
            controller.process_telemetry(&telemetry).await
        }));
    }

    let mut run_ids = std::collections::HashSet::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let summary = handle.await.unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.requires_action, i % 2 == 0);
        assert!(run_ids.insert(summary.run_id));
    }
}

// ---------------------------------------------------------------------------
// Supplementary operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_generate_rca_capa_reports_action() {
    let (controller, scorer) = stub_controller(0.0, ControllerConfig::default());
    controller.initialize().await;

    let diagnosis = json!({
        "findings": ["Brake pads worn"],
        "root_causes": ["Normal wear"],
        "severity": "high"
    });
    let result = controller
        .generate_rca_capa("VH001", diagnosis.as_object().unwrap().clone(), None)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.worker_id, "rca-capa-001");
    assert!(result.task_id.starts_with("RCA-"));

    let actions = scorer.actions.lock();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, "generate");
    assert_eq!(actions[0].target_entity, "capa_report");
}

#[tokio::test]
async fn test_collect_feedback_dispatches_to_feedback_worker() {
    let (controller, _) = stub_controller(0.0, ControllerConfig::default());
    controller.initialize().await;

    let result = controller.collect_feedback("APT-42", "CUST-VH001").await.unwrap();
    assert!(result.success);
    assert!(result.task_id.starts_with("FB-"));
    assert_eq!(result.worker_id, "feedback-001");
}
