//! Master controller for AutoSentry.
//!
//! Selects one agent backend at startup, registers the worker roster on it,
//! and runs the telemetry workflow for each subject, consulting the
//! prediction and behavior-scoring services along the way.
//!
//! # Main types
//!
//! - [`MasterController`]: runs workflows, RCA/CAPA generation and feedback collection.
//! - [`RunSummary`]: per-run outcome with one [`StageOutcome`] per executed stage.
//! - [`PredictionService`] / [`BehaviorScorer`]: collaborator contracts with HTTP clients.
//! - [`WorkerMonitor`]: per-worker-kind dispatch metrics.
//! - [`ControllerConfig`]: TOML and environment configuration.

/// Collaborator service clients.
pub mod collaborators;
/// Controller configuration.
pub mod config;
/// The master controller and its workflow.
pub mod controller;
/// Worker dispatch metrics.
pub mod monitor;
/// Default worker roster.
pub mod roster;
/// Run summaries and stage outcomes.
pub mod run;

pub use collaborators::{
    AgentAction, BehaviorReport, BehaviorScorer, HttpBehaviorScorer, HttpPredictionService,
    PredictionService,
};
pub use config::ControllerConfig;
pub use controller::MasterController;
pub use monitor::{WorkerMetrics, WorkerMonitor, WorkerState, WorkerStatus};
pub use roster::{default_roster, WorkerProfile};
pub use run::{stage, RunStatus, RunSummary, StageOutcome};
