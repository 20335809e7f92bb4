//! Version merge rules for component records.
//!
//! Merging does not compare versions: callers add versions in
//! non-decreasing order, and some backfill older ones on purpose for tag
//! bookkeeping. The only check is that a prerelease never becomes the
//! component's `version`.

use gauge_types::is_prerelease;

use crate::models::{ComponentRecord, TagOptions};

/// A fresh component record holding a single version.
pub fn new_component(
    group: &str,
    name: &str,
    pkg: &str,
    org: &str,
    version: &str,
    tags: &TagOptions,
) -> ComponentRecord {
    ComponentRecord {
        id: String::new(),
        name: name.to_string(),
        group: group.to_string(),
        org: org.to_string(),
        pkg: pkg.to_string(),
        versions: vec![version.to_string()],
        version: (!is_prerelease(version)).then(|| version.to_string()),
        tags: tags.apply(None),
    }
}

/// Merge `version` into `record`.
///
/// Returns `None` if the merge changes nothing, so callers can skip the write.
pub fn merge_version(
    record: &ComponentRecord,
    version: &str,
    tags: &TagOptions,
) -> Option<ComponentRecord> {
    let mut merged = record.clone();
    if !merged.versions.iter().any(|v| v == version) {
        merged.versions.push(version.to_string());
    }
    if !is_prerelease(version) {
        merged.version = Some(version.to_string());
    }
    merged.tags = tags.apply(record.tags.as_ref());

    (merged != *record).then_some(merged)
}
