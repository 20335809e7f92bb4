use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use gauge_store::Record;
use gauge_types::KindNames;
use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// The run "type" discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Test,
    Build,
}

impl RunKind {
    /// Parse a discriminator. Anything but `test` or `build` is rejected.
    pub fn parse(raw: &str) -> Result<Self, RunError> {
        match raw {
            "test" => Ok(RunKind::Test),
            "build" => Ok(RunKind::Build),
            other => Err(RunError::Validation(format!("unknown run type: {other:?}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Test => "test",
            RunKind::Build => "build",
        }
    }

    /// Store kind holding runs of this type.
    pub fn store_kind<'a>(&self, kinds: &'a KindNames) -> &'a str {
        match self {
            RunKind::Test => &kinds.test_run,
            RunKind::Build => &kinds.build,
        }
    }
}

impl FromStr for RunKind {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Finished,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Passed,
    Failed,
}

impl RunOutcome {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            RunOutcome::Passed
        } else {
            RunOutcome::Failed
        }
    }
}

/// Input to [`insert`](crate::RunTracker::insert).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewRun {
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    #[serde(default)]
    pub id: String,
    pub kind: RunKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
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
}

impl Record for RunRecord {
    const UNINDEXED: &'static [&'static str] = &["message"];
}

/// A component exercised by a run.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RunComponentInput {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub passed: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunComponentRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunOutcome>,
}

impl Record for RunComponentRecord {}

/// One line of run output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogRecord {
    #[serde(default)]
    pub id: String,
    pub line: String,
    #[serde(with = "gauge_types::timestamp")]
    pub created: DateTime<Utc>,
}

impl Record for RunLogRecord {
    const UNINDEXED: &'static [&'static str] = &["line"];
}
