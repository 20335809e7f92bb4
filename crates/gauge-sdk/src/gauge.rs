use std::path::Path;
use std::sync::Arc;

use gauge_coverage::CoverageEngine;
use gauge_registry::ComponentRegistry;
use gauge_runs::RunTracker;
use gauge_store::{InMemoryStore, Store};
use gauge_types::{GaugeConfig, KeyBuilder};
use tracing::info;

use crate::error::SdkResult;

/// Every Gauge component, built from one config over one shared store.
#[derive(Clone)]
pub struct Gauge {
    config: GaugeConfig,
    store: Arc<dyn Store>,
    registry: ComponentRegistry,
    coverage: CoverageEngine,
    runs: RunTracker,
}

impl Gauge {
    /// Validate `config` and build the components on `store`.
    pub fn new(config: GaugeConfig, store: Arc<dyn Store>) -> SdkResult<Self> {
        config.validate()?;
        let keys = KeyBuilder::new(&config);
        let limits = config.pagination;
        info!(
            registry = %config.namespaces.registry,
            coverage = %config.namespaces.coverage,
            runs = %config.namespaces.runs,
            "gauge initialized"
        );
        Ok(Self {
            registry: ComponentRegistry::new(Arc::clone(&store), keys.clone(), limits),
            coverage: CoverageEngine::new(Arc::clone(&store), keys.clone(), limits),
            runs: RunTracker::new(Arc::clone(&store), keys, limits),
            config,
            store,
        })
    }

    /// Load the config from a TOML file.
    pub fn from_config_path(path: impl AsRef<Path>, store: Arc<dyn Store>) -> SdkResult<Self> {
        let config = GaugeConfig::from_path(path)?;
        Self::new(config, store)
    }

    /// Default config over a fresh [`InMemoryStore`].
    pub fn in_memory() -> SdkResult<Self> {
        Self::new(GaugeConfig::default(), Arc::new(InMemoryStore::new()))
    }

    pub fn config(&self) -> &GaugeConfig {
        &self.config
    }

    /// The shared store every component writes through.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn coverage(&self) -> &CoverageEngine {
        &self.coverage
    }

    pub fn runs(&self) -> &RunTracker {
        &self.runs
    }
}
