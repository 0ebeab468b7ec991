use crate::backend::AgentBackend;
use crate::backends::builtin::BuiltinBackend;
use crate::backends::process::ProcessBackend;
use crate::backends::remote::RemoteBackend;
use crate::retry::RetryPolicy;
use autosentry_core::AutosentryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Which backend variant executes worker tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process rule handlers. Always available.
    #[default]
    Builtin,
    /// An agent runtime reachable over HTTP.
    Remote,
    /// An agent runtime launched as a local subprocess per task.
    Process,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Builtin => "builtin",
            BackendKind::Remote => "remote",
            BackendKind::Process => "process",
        }
    }

    /// Parse a backend name, falling back to [`BackendKind::Builtin`] with a
    /// warning when the name is not recognized.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|e| {
            warn!(backend = name, error = %e, "Unknown agent backend, using builtin");
            BackendKind::Builtin
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = AutosentryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" => Ok(BackendKind::Builtin),
            "remote" => Ok(BackendKind::Remote),
            "process" => Ok(BackendKind::Process),
            other => Err(AutosentryError::Config(format!(
                "unknown backend '{other}' (expected builtin, remote or process)"
            ))),
        }
    }
}

/// HTTP agent runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRuntimeConfig {
    /// Base URL of the runtime. `None` leaves the backend in fallback mode.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sent as a bearer token when set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_runtime_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteRuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_runtime_timeout_secs(),
        }
    }
}

/// Subprocess agent runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRuntimeConfig {
    /// Executable name or path. Bare names are resolved through `PATH`.
    #[serde(default = "default_process_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_runtime_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProcessRuntimeConfig {
    fn default() -> Self {
        Self {
            command: default_process_command(),
            args: Vec::new(),
            timeout_secs: default_runtime_timeout_secs(),
        }
    }
}

/// Settings shared by all backend variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Maximum concurrent calls into an external runtime.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub remote: RemoteRuntimeConfig,
    #[serde(default)]
    pub process: ProcessRuntimeConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            remote: RemoteRuntimeConfig::default(),
            process: ProcessRuntimeConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_pool_size() -> usize {
    10
}

fn default_runtime_timeout_secs() -> u64 {
    30
}

fn default_process_command() -> String {
    "autosentry-agent-runtime".into()
}

/// Build the backend for `kind`. Construction never fails; an unreachable
/// runtime is detected later by `initialize`.
pub fn create_backend(kind: BackendKind, options: &BackendOptions) -> Arc<dyn AgentBackend> {
    match kind {
        BackendKind::Builtin => {
            Arc::new(BuiltinBackend::new().with_retry_policy(options.retry.clone()))
        }
        BackendKind::Remote => Arc::new(
            RemoteBackend::new(options.remote.clone(), options.pool_size)
                .with_retry_policy(options.retry.clone()),
        ),
        BackendKind::Process => Arc::new(
            ProcessBackend::new(options.process.clone(), options.pool_size)
                .with_retry_policy(options.retry.clone()),
        ),
    }
}
