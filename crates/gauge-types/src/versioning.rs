//! Semantic version helpers.
//!
//! Parsing is lenient about surrounding whitespace and a leading `v` or `=`
//! (`"v1.2.0"` is `1.2.0`). Ordering follows semver precedence: build
//! metadata is ignored and a prerelease sorts below its release.

use std::cmp::Ordering;

use semver::Version;

/// Parse a version string, returning `None` if it is not semver.
pub fn parse_version(version: &str) -> Option<Version> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('='))
        .unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

/// `true` if the string is semver and carries a prerelease qualifier.
pub fn is_prerelease(version: &str) -> bool {
    parse_version(version).is_some_and(|v| !v.pre.is_empty())
}

/// `true` if the string is semver without a prerelease qualifier.
pub fn is_release(version: &str) -> bool {
    parse_version(version).is_some_and(|v| v.pre.is_empty())
}

/// Semver precedence of two parsed versions.
pub fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// `true` if both strings parse and `candidate` has strictly higher precedence.
pub fn is_newer(candidate: &str, than: &str) -> bool {
    match (parse_version(candidate), parse_version(than)) {
        (Some(a), Some(b)) => precedence(&a, &b) == Ordering::Greater,
        _ => false,
    }
}

/// The greatest released version in `versions`.
///
/// Prereleases and strings that are not semver are skipped. Returns the
/// original string as supplied, or `None` if nothing qualifies.
pub fn find_latest_version<I, S>(versions: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut latest: Option<(Version, String)> = None;
    for raw in versions {
        let raw = raw.as_ref();
        let Some(parsed) = parse_version(raw) else {
            continue;
        };
        if !parsed.pre.is_empty() {
            continue;
        }
        let replace = match &latest {
            Some((best, _)) => precedence(&parsed, best) == Ordering::Greater,
            None => true,
        };
        if replace {
            latest = Some((parsed, raw.to_string()));
        }
    }
    latest.map(|(_, raw)| raw)
}
