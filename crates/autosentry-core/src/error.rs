use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A convenience `Result` alias using [`AutosentryError`].
pub type AutosentryResult<T> = Result<T, AutosentryError>;

/// Top-level error type shared by every AutoSentry crate.
#[derive(Error, Debug)]
pub enum AutosentryError {
    /// No worker is registered under the requested id or kind.
    #[error("Worker {0} not found")]
    WorkerNotFound(String),

    /// No registered worker can take a task of this kind.
    #[error("No suitable worker found for task kind '{0}'")]
    NoSuitableWorker(String),

    /// The selected backend (or its optional runtime) cannot be used.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A worker's task logic failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A task exceeded its `timeout_secs`.
    #[error("Task timed out after {0}s")]
    Timeout(u64),

    /// An external collaborator service could not be reached or answered badly.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// A task input is missing a key required for its kind.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("Config error: {0}")]
    Config(String),

    /// An error in the orchestrator's own stage sequencing.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The error taxonomy recorded on failed results (`metadata.error_kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    WorkerNotFound,
    BackendUnavailable,
    ExecutionFailure,
    Timeout,
    CollaboratorUnreachable,
    ValidationFailure,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::WorkerNotFound => "worker_not_found",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::ExecutionFailure => "execution_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CollaboratorUnreachable => "collaborator_unreachable",
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AutosentryError {
    /// Classify this error into the result taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutosentryError::WorkerNotFound(_) | AutosentryError::NoSuitableWorker(_) => {
                ErrorKind::WorkerNotFound
            }
            AutosentryError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            AutosentryError::Execution(_) | AutosentryError::Http(_) => {
                ErrorKind::ExecutionFailure
            }
            AutosentryError::Timeout(_) => ErrorKind::Timeout,
            AutosentryError::Collaborator(_) => ErrorKind::CollaboratorUnreachable,
            AutosentryError::Validation(_) => ErrorKind::ValidationFailure,
            AutosentryError::Config(_)
            | AutosentryError::Orchestrator(_)
            | AutosentryError::Json(_)
            | AutosentryError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether another attempt of the same task could succeed.
    ///
    /// Execution failures, transport errors and timeouts are transient;
    /// a missing worker or malformed input will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutosentryError::Execution(_) | AutosentryError::Http(_) | AutosentryError::Timeout(_)
        )
    }
}
