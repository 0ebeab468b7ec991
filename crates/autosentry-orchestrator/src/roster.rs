use autosentry_agent::WorkerConfig;
use autosentry_core::WorkerKind;

/// One worker the controller registers with its backend.
#[derive(Debug, Clone)]
pub struct WorkerProfile {
    pub kind: WorkerKind,
    pub worker_id: String,
    pub config: WorkerConfig,
}

/// The fixed roster of workers the master controller creates at startup.
pub fn default_roster() -> Vec<WorkerProfile> {
    vec![
        profile(
            WorkerKind::DataAnalysis,
            "data-analysis-001",
            &["telemetry_reader", "threshold_table"],
        ),
        profile(
            WorkerKind::Diagnosis,
            "diagnosis-001",
            &["diagnosis_rules", "maintenance_history"],
        ),
        profile(
            WorkerKind::CustomerEngagement,
            "customer-engagement-001",
            &["notification_templates"],
        ),
        profile(
            WorkerKind::Scheduling,
            "scheduling-001",
            &["service_calendar"],
        ),
        profile(WorkerKind::Feedback, "feedback-001", &["survey_builder"]),
        profile(
            WorkerKind::RcaCapa,
            "rca-capa-001",
            &["five_whys", "capa_register"],
        ),
    ]
}

fn profile(kind: WorkerKind, worker_id: &str, tools: &[&str]) -> WorkerProfile {
    WorkerProfile {
        kind,
        worker_id: worker_id.to_string(),
        config: WorkerConfig {
            tools: tools.iter().map(ToString::to_string).collect(),
            ..WorkerConfig::default()
        },
    }
}
