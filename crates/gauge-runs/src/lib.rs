//! Test and build run tracking.
//!
//! Runs are keyed by their type (`test` or `build`) and id. Components and
//! log lines attached to a run are stored under the run's key.

pub mod error;
pub mod models;
pub mod tracker;

pub use error::{RunError, RunResult};
pub use models::{
    NewRun, RunComponentInput, RunComponentRecord, RunKind, RunLogRecord, RunOutcome, RunRecord,
    RunStatus,
};
pub use tracker::RunTracker;
