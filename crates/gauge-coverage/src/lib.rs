//! Coverage aggregation engine.
//!
//! Tracks coverage runs through `queued → running → finished` and, when a
//! run finishes, rolls its report up into file, version, and component
//! aggregates in one unit of work. The component aggregate only moves
//! forward: a prerelease tag or a tag older than the stored version leaves
//! it untouched.

pub mod engine;
pub mod error;
pub mod models;

pub use engine::CoverageEngine;
pub use error::{CoverageError, CoverageResult};
pub use models::{
    ComponentCoverageRecord, CoverageMetric, CoverageReport, CoverageRunRecord, CoverageSummary,
    FileCoverage, FileCoverageRecord, NewCoverageRun, RunQuery, RunStatus, VersionCoverageRecord,
};
