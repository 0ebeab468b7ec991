use autosentry_agent::{BackendKind, BackendOptions};
use autosentry_core::{AutosentryError, AutosentryResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings of the master controller, usually read from `autosentry.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Backend variant name: `builtin`, `remote` or `process`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_prediction_url")]
    pub prediction_url: String,
    #[serde(default = "default_behavior_url")]
    pub behavior_url: String,
    /// Upper bound on each collaborator call.
    #[serde(default = "default_collaborator_timeout_secs")]
    pub collaborator_timeout_secs: u64,
    /// Diagnosis runs when the predicted failure probability exceeds this.
    #[serde(default = "default_diagnosis_probability_threshold")]
    pub diagnosis_probability_threshold: f64,
    /// Diagnosis severities that start engagement and scheduling.
    #[serde(default = "default_service_severities")]
    pub service_severities: Vec<String>,
    /// Identity the controller reports to behavior scoring.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default)]
    pub backend_options: BackendOptions,
}

fn default_backend() -> String {
    BackendKind::Builtin.to_string()
}
fn default_prediction_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_behavior_url() -> String {
    "http://localhost:5001".to_string()
}
fn default_collaborator_timeout_secs() -> u64 {
    30
}
fn default_diagnosis_probability_threshold() -> f64 {
    0.3
}
fn default_service_severities() -> Vec<String> {
    vec!["medium".into(), "high".into(), "critical".into()]
}
fn default_agent_id() -> String {
    "master-001".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            prediction_url: default_prediction_url(),
            behavior_url: default_behavior_url(),
            collaborator_timeout_secs: default_collaborator_timeout_secs(),
            diagnosis_probability_threshold: default_diagnosis_probability_threshold(),
            service_severities: default_service_severities(),
            agent_id: default_agent_id(),
            backend_options: BackendOptions::default(),
        }
    }
}

impl ControllerConfig {
    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> AutosentryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AutosentryError::Config(format!(
                "Failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            AutosentryError::Config(format!(
                "Failed to parse config '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_toml_str(content: &str) -> AutosentryResult<Self> {
        toml::from_str(content).map_err(|e| AutosentryError::Config(e.to_string()))
    }

    /// Overlay `AGENT_FRAMEWORK`, `ML_SERVICE_URL` and `UEBA_SERVICE_URL`.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay environment values obtained through `lookup`. Empty values are ignored.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(backend) = get("AGENT_FRAMEWORK") {
            self.backend = backend.trim().to_ascii_lowercase();
        }
        if let Some(url) = get("ML_SERVICE_URL") {
            self.prediction_url = url;
        }
        if let Some(url) = get("UEBA_SERVICE_URL") {
            self.behavior_url = url;
        }
        self
    }

    /// The configured backend variant; unknown names select `builtin`.
    pub fn backend_kind(&self) -> BackendKind {
        BackendKind::parse_or_default(&self.backend)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }

    pub fn is_service_severity(&self, severity: &str) -> bool {
        self.service_severities
            .iter()
            .any(|s| s.eq_ignore_ascii_case(severity))
    }
}
