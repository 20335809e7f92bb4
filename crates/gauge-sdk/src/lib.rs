//! High-level SDK for Gauge.
//!
//! [`Gauge`] is the composition root: it builds the component registry,
//! the coverage engine, and the run tracker from one [`GaugeConfig`] over
//! one shared [`Store`]. Applications embedding Gauge start here.

pub mod error;
pub mod gauge;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{SdkError, SdkResult};
pub use gauge::Gauge;

pub use gauge_coverage::{CoverageEngine, CoverageError, CoverageReport, RunStatus};
pub use gauge_registry::{ComponentRegistry, PublishRequest, RegistryError, TagOptions};
pub use gauge_runs::{RunError, RunKind, RunTracker};
pub use gauge_store::{InMemoryStore, Page, PageRequest, Store, StoreError};
pub use gauge_types::{GaugeConfig, Key, KeyBuilder};
