use autosentry_core::{Payload, TaskResult};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Stage names as they appear in [`RunSummary::stages`].
pub mod stage {
    pub const BEHAVIOR_CHECK: &str = "behavior_check";
    pub const ANALYSIS: &str = "analysis";
    pub const PREDICTION: &str = "prediction";
    pub const DIAGNOSIS: &str = "diagnosis";
    pub const ENGAGEMENT: &str = "engagement";
    pub const SCHEDULING: &str = "scheduling";
    pub const SCHEDULING_BEHAVIOR_CHECK: &str = "scheduling_behavior_check";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Stages are still executing.
    Running,
    Completed,
    Failed,
}

/// What one stage produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StageOutcome {
    /// A task dispatched to a worker.
    Task(TaskResult),
    /// A collaborator response. `degraded` is set when the neutral value
    /// stands in for an unreachable service.
    Collaborator {
        response: Payload,
        #[serde(default)]
        degraded: bool,
    },
}

impl StageOutcome {
    /// The task output or collaborator response.
    pub fn output(&self) -> &Payload {
        match self {
            StageOutcome::Task(result) => &result.output,
            StageOutcome::Collaborator { response, .. } => response,
        }
    }

    pub fn task_result(&self) -> Option<&TaskResult> {
        match self {
            StageOutcome::Task(result) => Some(result),
            StageOutcome::Collaborator { .. } => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        match self {
            StageOutcome::Task(result) => result.success,
            StageOutcome::Collaborator { degraded, .. } => !degraded,
        }
    }
}

/// The structured outcome of one workflow run for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub subject_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Stages in the order they ran.
    pub stages: IndexMap<String, StageOutcome>,
    pub status: RunStatus,
    pub requires_action: bool,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            subject_id: subject_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            stages: IndexMap::new(),
            status: RunStatus::Running,
            requires_action: false,
            error: None,
        }
    }

    /// Record a stage. Each stage is recorded at most once per run.
    pub(crate) fn record(&mut self, name: &str, outcome: StageOutcome) {
        self.stages.insert(name.to_string(), outcome);
    }

    pub(crate) fn complete(&mut self, requires_action: bool) {
        self.status = RunStatus::Completed;
        self.requires_action = requires_action;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = RunStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.get(name)
    }

    pub fn has_stage(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// The output of a stage, if it ran.
    pub fn stage_output(&self, name: &str) -> Option<&Payload> {
        self.stage(name).map(StageOutcome::output)
    }
}
