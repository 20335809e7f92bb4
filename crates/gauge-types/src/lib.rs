//! Foundation types for Gauge, the component registry and coverage backend.
//!
//! Every other Gauge crate depends on `gauge-types`.
//!
//! # Key Types
//!
//! - [`Key`]: hierarchical record address (namespace + `(kind, name)` path)
//! - [`KeyBuilder`]: builds registry, coverage, and run keys from names
//! - [`GaugeConfig`]: namespaces, kind names, and pagination limits
//!
//! Free functions cover slugging ([`slug()`]) and semver ordering
//! ([`find_latest_version`], [`is_prerelease`], [`is_newer`]).

pub mod config;
pub mod error;
pub mod key;
pub mod slug;
pub mod timestamp;
pub mod versioning;

pub use config::{GaugeConfig, KindNames, Namespaces, PaginationConfig};
pub use error::{ConfigError, TypeError};
pub use key::{Key, KeyBuilder, PathElement};
pub use slug::{slug, try_slug};
pub use versioning::{find_latest_version, is_newer, is_prerelease, is_release, parse_version};
