//! Coverage run and rollup records.
//!
//! Field names serialize in camelCase, matching what the dashboard reads.

use std::fmt;

use chrono::{DateTime, Utc};
use gauge_store::{PageRequest, Record};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Finished,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One coverage dimension (lines, branches, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageMetric {
    pub total: u64,
    pub covered: u64,
    #[serde(default)]
    pub skipped: u64,
    pub pct: f64,
}

impl CoverageMetric {
    /// A metric with `pct` derived from the counts.
    pub fn from_counts(covered: u64, total: u64) -> Self {
        let pct = if total == 0 {
            100.0
        } else {
            (covered as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        Self {
            total,
            covered,
            skipped: 0,
            pct,
        }
    }
}

/// Summary of a run. Missing dimensions are omitted, not stored as null.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<CoverageMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statements: Option<CoverageMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<CoverageMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<CoverageMetric>,
}

/// Per-file entry of a detailed report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub file: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub functions: Option<CoverageMetric>,
    #[serde(default)]
    pub lines: Option<CoverageMetric>,
    #[serde(default)]
    pub branches: Option<CoverageMetric>,
    /// Overall percentage for the file.
    pub coverage: f64,
}

/// What a finished run reports.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub summary: CoverageSummary,
    #[serde(default)]
    pub files: Vec<FileCoverage>,
}

/// Input to [`insert`](crate::CoverageEngine::insert).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewCoverageRun {
    pub component: String,
    pub org: String,
    pub tag: String,
    pub branch: String,
    #[serde(default)]
    pub creator: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRunRecord {
    #[serde(default)]
    pub id: String,
    pub component: String,
    pub org: String,
    pub tag: String,
    pub branch: String,
    pub status: RunStatus,
    #[serde(with = "gauge_types::timestamp")]
    pub created: DateTime<Utc>,
    #[serde(
        default,
        with = "gauge_types::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "gauge_types::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageSummary>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

impl Record for CoverageRunRecord {
    const UNINDEXED: &'static [&'static str] = &["coverage", "message"];
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverageRecord {
    #[serde(default)]
    pub id: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<CoverageMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<CoverageMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<CoverageMetric>,
    pub coverage: f64,
    /// Run that produced this entry.
    pub coverage_id: String,
}

impl Record for FileCoverageRecord {
    const UNINDEXED: &'static [&'static str] = &["functions", "lines", "branches"];
}

/// Latest summary for one `(component, org, version)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCoverageRecord {
    #[serde(default)]
    pub id: String,
    pub coverage: CoverageSummary,
    pub version: String,
    pub coverage_id: String,
}

impl Record for VersionCoverageRecord {
    const UNINDEXED: &'static [&'static str] = &["coverage"];
}

/// Summary for the highest released version seen for `(component, org)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCoverageRecord {
    #[serde(default)]
    pub id: String,
    pub coverage: CoverageSummary,
    pub version: String,
    pub coverage_id: String,
}

impl Record for ComponentCoverageRecord {
    const UNINDEXED: &'static [&'static str] = &["coverage"];
}

/// Filters for [`list_runs`](crate::CoverageEngine::list_runs).
#[derive(Clone, Debug, Default)]
pub struct RunQuery {
    pub component: Option<String>,
    pub org: Option<String>,
    pub page: PageRequest,
}
