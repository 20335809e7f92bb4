//! Registry record shapes.

use chrono::{DateTime, Utc};
use gauge_store::{PageRequest, Record};
use serde::{Deserialize, Serialize};

/// A named collection of components. Keyed by `slug(name)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

impl Record for GroupRecord {}

/// A published component and its version bookkeeping.
///
/// `versions` never holds duplicates. `version` is the last released
/// (non-prerelease) version merged in, or absent if there is none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Human-readable name of the owning group.
    pub group: String,
    pub org: String,
    pub pkg: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Record for ComponentRecord {}

/// One published version of a component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Serialized documentation blob.
    pub docs: String,
    #[serde(with = "gauge_types::timestamp")]
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Record for VersionRecord {
    const UNINDEXED: &'static [&'static str] = &["docs", "changelog"];
}

/// How a version add treats the component's tag list.
///
/// Non-empty `tags` replace the list. Otherwise the list is kept when
/// `keep_tags` is set and removed when it is not; `Some(vec![])` always
/// clears.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagOptions {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub keep_tags: bool,
}

impl TagOptions {
    /// Replace stored tags with `tags`.
    pub fn replace<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            keep_tags: false,
        }
    }

    /// Leave stored tags untouched.
    pub fn keep() -> Self {
        Self {
            tags: None,
            keep_tags: true,
        }
    }

    pub fn clear() -> Self {
        Self {
            tags: Some(Vec::new()),
            keep_tags: false,
        }
    }

    /// The tag list that results from applying these options to `current`.
    pub fn apply(&self, current: Option<&Vec<String>>) -> Option<Vec<String>> {
        match &self.tags {
            Some(tags) if !tags.is_empty() => Some(tags.clone()),
            Some(_) => None,
            None if self.keep_tags => current.cloned(),
            None => None,
        }
    }
}

/// Filters for [`list_components`](crate::ComponentRegistry::list_components).
#[derive(Clone, Debug, Default)]
pub struct ComponentQuery {
    pub group: Option<String>,
    /// Every tag must be present.
    pub tags: Vec<String>,
    pub page: PageRequest,
}

/// Everything needed to publish one version of a component.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub group: String,
    pub name: String,
    pub pkg: String,
    pub org: String,
    pub version: String,
    #[serde(default)]
    pub docs: String,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(flatten)]
    pub tags: TagOptions,
}

/// Result of [`publish`](crate::ComponentRegistry::publish).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    pub group: GroupRecord,
    pub component: ComponentRecord,
    pub version: VersionRecord,
}
