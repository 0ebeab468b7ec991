use crate::collaborators::{
    AgentAction, BehaviorReport, BehaviorScorer, HttpBehaviorScorer, HttpPredictionService,
    PredictionService,
};
use crate::config::ControllerConfig;
use crate::monitor::WorkerMonitor;
use crate::roster::{default_roster, WorkerProfile};
use crate::run::{stage, RunSummary, StageOutcome};
use autosentry_agent::handlers::short_id;
use autosentry_agent::{create_backend, AgentBackend};
use autosentry_core::{
    AutosentryError, AutosentryResult, Payload, Task, TaskKind, TaskResult, WorkerInfo, WorkerKind,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// The master controller.
///
/// Owns one backend variant and the worker roster registered on it, and runs
/// the telemetry workflow:
/// behavior check → analysis → prediction → diagnosis (conditional) →
/// engagement → scheduling → scheduling behavior check (conditional).
///
/// Runs share nothing but the backend and the monitor, so any number of
/// [`process_telemetry`](Self::process_telemetry) calls may be in flight.
pub struct MasterController {
    config: ControllerConfig,
    backend: Arc<dyn AgentBackend>,
    prediction: Arc<dyn PredictionService>,
    behavior: Arc<dyn BehaviorScorer>,
    monitor: Arc<WorkerMonitor>,
    roster: Vec<WorkerProfile>,
    workers: RwLock<HashMap<WorkerKind, String>>,
    shut_down: AtomicBool,
}

impl MasterController {
    /// Build a controller whose backend and collaborators come from `config`.
    pub fn new(config: ControllerConfig) -> Self {
        let backend = create_backend(config.backend_kind(), &config.backend_options);
        let timeout = config.collaborator_timeout();
        let prediction = Arc::new(HttpPredictionService::new(&config.prediction_url, timeout));
        let behavior = Arc::new(HttpBehaviorScorer::new(&config.behavior_url, timeout));
        Self::with_components(config, backend, prediction, behavior)
    }

    /// Build a controller around explicit components.
    pub fn with_components(
        config: ControllerConfig,
        backend: Arc<dyn AgentBackend>,
        prediction: Arc<dyn PredictionService>,
        behavior: Arc<dyn BehaviorScorer>,
    ) -> Self {
        Self {
            config,
            backend,
            prediction,
            behavior,
            monitor: Arc::new(WorkerMonitor::new()),
            roster: default_roster(),
            workers: RwLock::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Replace the roster registered by [`initialize`](Self::initialize).
    pub fn with_roster(mut self, roster: Vec<WorkerProfile>) -> Self {
        self.roster = roster;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn AgentBackend> {
        &self.backend
    }

    pub fn monitor(&self) -> &Arc<WorkerMonitor> {
        &self.monitor
    }

    /// Initialize the backend and register the roster.
    ///
    /// Workers are registered even when the backend reports itself
    /// unavailable; alternate backends then serve every task through their
    /// fallback path. Returns whether the backend initialized fully.
    pub async fn initialize(&self) -> bool {
        info!(backend = self.backend.name(), agent_id = %self.config.agent_id, "Initializing master controller");
        let ready = self.backend.initialize().await;
        if !ready {
            warn!(
                backend = self.backend.name(),
                "Agent backend unavailable, continuing in degraded mode"
            );
        }

        let mut workers = self.workers.write().await;
        for profile in &self.roster {
            let info = self.backend.create_worker(
                profile.kind,
                &profile.worker_id,
                profile.config.clone(),
            );
            // First registration of a kind wins, as in backend routing.
            workers.entry(info.worker_kind).or_insert(info.worker_id);
        }
        self.shut_down.store(false, Ordering::SeqCst);
        info!(workers = workers.len(), "Master controller ready");
        ready
    }

    /// Workers registered on the backend.
    pub fn list_workers(&self) -> Vec<WorkerInfo> {
        self.backend.list_workers()
    }

    pub async fn worker_id(&self, kind: WorkerKind) -> Option<String> {
        self.workers.read().await.get(&kind).cloned()
    }

    /// Run the full workflow for one telemetry bundle.
    ///
    /// Never returns an error: a run that cannot proceed comes back with
    /// `status = failed`, the triggering error, and the stages collected so far.
    pub async fn process_telemetry(&self, telemetry: &Value) -> RunSummary {
        let run_id = short_id("WF");
        let subject_id = telemetry
            .get("vehicle_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let mut summary = RunSummary::new(run_id, subject_id);
        info!(run_id = %summary.run_id, subject_id = %summary.subject_id, "Processing telemetry");

        match self.run_stages(telemetry, &mut summary).await {
            Ok(requires_action) => {
                summary.complete(requires_action);
                info!(
                    run_id = %summary.run_id,
                    requires_action,
                    stages = summary.stages.len(),
                    "Workflow completed"
                );
            }
            Err(e) => {
                error!(run_id = %summary.run_id, error = %e, "Workflow failed");
                summary.fail(e.to_string());
            }
        }
        summary
    }

    /// Returns whether diagnosis was entered.
    async fn run_stages(&self, telemetry: &Value, summary: &mut RunSummary) -> AutosentryResult<bool> {
        let Value::Object(bundle) = telemetry else {
            return Err(AutosentryError::Orchestrator(
                "telemetry bundle must be a JSON object".into(),
            ));
        };
        let run_id = summary.run_id.clone();
        let subject_id = summary.subject_id.clone();

        let check = self
            .report_action(AgentAction {
                agent_id: self.config.agent_id.clone(),
                agent_type: WorkerKind::Master.to_string(),
                action_type: "query".into(),
                target_entity: "telemetry".into(),
                subject_id: subject_id.clone(),
                payload_size: serde_json::to_vec(bundle)?.len(),
                response_time_ms: 0.0,
                success: true,
            })
            .await;
        if check.stage_alert() {
            warn!(run_id = %run_id, "Behavior alert raised for workflow");
        }
        summary.record(stage::BEHAVIOR_CHECK, check.into_outcome());

        let analysis = self
            .dispatch(
                WorkerKind::DataAnalysis,
                Task::new(
                    format!("{run_id}-analysis"),
                    TaskKind::Analyze,
                    format!("Analyze telemetry data for vehicle {subject_id}"),
                )
                .with_input_value("telemetry", telemetry.clone())
                .with_priority(1),
            )
            .await?;
        summary.record(stage::ANALYSIS, StageOutcome::Task(analysis.clone()));

        let (prediction, degraded) = self.predict(bundle).await;
        summary.record(
            stage::PREDICTION,
            StageOutcome::Collaborator {
                response: prediction.clone(),
                degraded,
            },
        );

        let probability = prediction
            .get("failure_probability")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let needs_attention = analysis.output_str("overall_status") == Some("needs_attention");
        let needs_diagnosis =
            probability > self.config.diagnosis_probability_threshold || needs_attention;
        if !needs_diagnosis {
            return Ok(false);
        }

        let diagnosis = self
            .dispatch(
                WorkerKind::Diagnosis,
                Task::new(
                    format!("{run_id}-diagnosis"),
                    TaskKind::Diagnose,
                    format!("Diagnose issues for vehicle {subject_id}"),
                )
                .with_input_value("analysis", Value::Object(analysis.output.clone()))
                .with_input_value("prediction", Value::Object(prediction))
                .with_priority(1),
            )
            .await?;
        summary.record(stage::DIAGNOSIS, StageOutcome::Task(diagnosis.clone()));

        let severity = diagnosis.output_str("severity").unwrap_or("low");
        if self.config.is_service_severity(severity) {
            info!(run_id = %run_id, severity, "Starting service workflow");
            self.service_workflow(&run_id, &subject_id, bundle, &diagnosis.output, summary)
                .await?;
        }
        Ok(true)
    }

    async fn service_workflow(
        &self,
        run_id: &str,
        subject_id: &str,
        bundle: &Payload,
        diagnosis: &Payload,
        summary: &mut RunSummary,
    ) -> AutosentryResult<()> {
        let customer = match bundle.get("customer") {
            Some(Value::Object(customer)) => Value::Object(customer.clone()),
            _ => json!({
                "id": format!("CUST-{subject_id}"),
                "name": "Valued Customer",
                "email": "customer@example.com",
                "phone": "+1-555-0100"
            }),
        };
        let service_type = diagnosis
            .get("findings")
            .and_then(|f| f.get(0))
            .and_then(Value::as_str)
            .unwrap_or("Service");

        let engagement = self
            .dispatch(
                WorkerKind::CustomerEngagement,
                Task::new(
                    format!("{run_id}-engage"),
                    TaskKind::Engage,
                    format!("Engage customer about vehicle {subject_id} maintenance"),
                )
                .with_input_value("appointment", json!({ "service_type": service_type }))
                .with_input_value("customer", customer.clone())
                .with_input_value("diagnosis", Value::Object(diagnosis.clone()))
                .with_priority(2),
            )
            .await?;
        summary.record(stage::ENGAGEMENT, StageOutcome::Task(engagement));

        let scheduling = self
            .dispatch(
                WorkerKind::Scheduling,
                Task::new(
                    format!("{run_id}-schedule"),
                    TaskKind::Schedule,
                    format!("Schedule service appointment for vehicle {subject_id}"),
                )
                .with_input_value("diagnosis", Value::Object(diagnosis.clone()))
                .with_input_value("customer", customer)
                .with_input_value("vehicle_id", json!(subject_id))
                .with_priority(2),
            )
            .await?;

        let check = self
            .report_action(AgentAction {
                agent_id: scheduling.worker_id.clone(),
                agent_type: WorkerKind::Scheduling.to_string(),
                action_type: "schedule".into(),
                target_entity: "appointment".into(),
                subject_id: subject_id.to_string(),
                payload_size: serde_json::to_vec(&scheduling.output)?.len(),
                response_time_ms: scheduling.execution_time_ms,
                success: scheduling.success,
            })
            .await;
        summary.record(stage::SCHEDULING, StageOutcome::Task(scheduling));
        summary.record(stage::SCHEDULING_BEHAVIOR_CHECK, check.into_outcome());
        Ok(())
    }

    /// Produce a root-cause / corrective-action report for a diagnosed subject.
    pub async fn generate_rca_capa(
        &self,
        subject_id: &str,
        diagnosis: Payload,
        feedback: Option<Payload>,
    ) -> AutosentryResult<TaskResult> {
        let task = Task::new(
            short_id("RCA"),
            TaskKind::RcaCapa,
            format!("Generate RCA/CAPA for vehicle {subject_id}"),
        )
        .with_input_value("diagnosis", Value::Object(diagnosis))
        .with_input_value("vehicle_data", json!({ "vehicle_id": subject_id }))
        .with_input_value("feedback", Value::Object(feedback.unwrap_or_default()))
        .with_priority(3);

        let result = self.dispatch(WorkerKind::RcaCapa, task).await?;
        self.report_action(AgentAction {
            agent_id: result.worker_id.clone(),
            agent_type: WorkerKind::RcaCapa.to_string(),
            action_type: "generate".into(),
            target_entity: "capa_report".into(),
            subject_id: subject_id.to_string(),
            payload_size: serde_json::to_vec(&result.output)?.len(),
            response_time_ms: result.execution_time_ms,
            success: result.success,
        })
        .await;
        Ok(result)
    }

    /// Start post-service feedback collection for an appointment.
    pub async fn collect_feedback(
        &self,
        appointment_id: &str,
        customer_id: &str,
    ) -> AutosentryResult<TaskResult> {
        let task = Task::new(
            short_id("FB"),
            TaskKind::Feedback,
            format!("Collect feedback for appointment {appointment_id}"),
        )
        .with_input_value("appointment_id", json!(appointment_id))
        .with_input_value("customer_id", json!(customer_id))
        .with_priority(4);
        self.dispatch(WorkerKind::Feedback, task).await
    }

    /// Shut the backend down. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down master controller");
        self.backend.shutdown().await;
        self.workers.write().await.clear();
    }

    async fn dispatch(&self, kind: WorkerKind, task: Task) -> AutosentryResult<TaskResult> {
        let worker_id = self.worker_id(kind).await.ok_or_else(|| {
            AutosentryError::Orchestrator(format!(
                "no {kind} worker registered; initialize the controller first"
            ))
        })?;

        self.monitor.start_task(kind, &task.id).await;
        let result = self.backend.execute_task(&worker_id, &task).await;
        self.monitor.finish_task(kind, &result).await;

        if result.success {
            info!(
                task_id = %task.id,
                worker_id = %worker_id,
                framework = result.framework().unwrap_or_default(),
                duration_ms = result.execution_time_ms,
                "Task completed"
            );
        } else {
            warn!(
                task_id = %task.id,
                worker_id = %worker_id,
                error = result.error.as_deref().unwrap_or_default(),
                "Task failed"
            );
        }
        Ok(result)
    }

    async fn predict(&self, telemetry: &Payload) -> (Payload, bool) {
        match self
            .bounded("prediction", self.prediction.predict(telemetry))
            .await
        {
            Ok(prediction) => (prediction, false),
            Err(e) => {
                warn!(error = %e, "Prediction unavailable, continuing without it");
                (Payload::new(), true)
            }
        }
    }

    async fn report_action(&self, action: AgentAction) -> BehaviorCheck {
        match self
            .bounded("behavior scoring", self.behavior.score(&action))
            .await
        {
            Ok(report) => BehaviorCheck {
                report,
                degraded: false,
            },
            Err(e) => {
                warn!(action = %action.action_type, error = %e, "Behavior scoring unavailable");
                BehaviorCheck {
                    report: BehaviorReport::neutral(),
                    degraded: true,
                }
            }
        }
    }

    /// Apply the collaborator timeout to a call.
    async fn bounded<T>(
        &self,
        service: &str,
        call: impl Future<Output = AutosentryResult<T>>,
    ) -> AutosentryResult<T> {
        match tokio::time::timeout(self.config.collaborator_timeout(), call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AutosentryError::Collaborator(format!(
                "{service} timed out after {}s",
                self.config.collaborator_timeout_secs
            ))),
        }
    }
}

struct BehaviorCheck {
    report: BehaviorReport,
    degraded: bool,
}

impl BehaviorCheck {
    fn stage_alert(&self) -> bool {
        self.report.alert
    }

    fn into_outcome(self) -> StageOutcome {
        StageOutcome::Collaborator {
            response: self.report.to_payload(),
            degraded: self.degraded,
        }
    }
}
