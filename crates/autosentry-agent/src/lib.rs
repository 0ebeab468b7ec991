//! Agent backends for AutoSentry.
//!
//! A backend registers worker agents and executes [`Task`](autosentry_core::Task)s
//! on them. Every variant implements the same [`AgentBackend`] contract, so the
//! controller can swap the built-in rule runtime for an external one without
//! changing how results are consumed.
//!
//! # Main types
//!
//! - [`AgentBackend`]: the capability contract (initialize, create_worker,
//!   execute_task, run_workflow, shutdown).
//! - [`BuiltinBackend`]: in-process rule handlers, the default.
//! - [`RemoteBackend`]: HTTP agent runtime with fallback execution.
//! - [`ProcessBackend`]: subprocess agent runtime with fallback execution.
//! - [`BackendKind`] / [`create_backend`]: selection by configuration.

pub mod backend;
pub mod backends;
pub mod config;
pub mod fallback;
pub mod handlers;
pub mod retry;

pub use backend::{priority_order, AgentBackend, WorkerConfig, WorkerRegistry, WorkflowConfig};
pub use backends::builtin::BuiltinBackend;
pub use backends::process::ProcessBackend;
pub use backends::remote::RemoteBackend;
pub use config::{
    create_backend, BackendKind, BackendOptions, ProcessRuntimeConfig, RemoteRuntimeConfig,
};
pub use fallback::{fallback_result, FallbackReason};
pub use handlers::{builtin_output, RuleHandler, TaskHandler};
pub use retry::{compute_backoff, run_attempts, RetryPolicy};
