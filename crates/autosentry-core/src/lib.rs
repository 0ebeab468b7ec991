//! Core types and error definitions for AutoSentry.
//!
//! Every other AutoSentry crate builds on the values defined here: the
//! [`Task`] a backend executes, the [`TaskResult`] it returns, and the
//! [`AutosentryError`] taxonomy used to classify failures.
//!
//! # Main types
//!
//! - [`Task`]: One unit of work with priority, timeout and retry budget.
//! - [`TaskResult`]: Outcome of a single executed attempt.
//! - [`TaskKind`] / [`WorkerKind`]: The static task → worker routing vocabulary.
//! - [`AutosentryError`]: Unified error enum; [`ErrorKind`] is its stable taxonomy.

/// Error types and taxonomy.
pub mod error;
/// Task, result and worker vocabulary.
pub mod task;

pub use error::{AutosentryError, AutosentryResult, ErrorKind};
pub use task::{Payload, Task, TaskKind, TaskResult, WorkerInfo, WorkerKind};
