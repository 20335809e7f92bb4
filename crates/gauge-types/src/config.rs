//! Naming and pagination configuration.
//!
//! One [`GaugeConfig`] is built at startup and handed to every component.
//! All fields have defaults, so an empty TOML document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaugeConfig {
    pub namespaces: Namespaces,
    pub kinds: KindNames,
    pub pagination: PaginationConfig,
}

/// Store namespaces, one per owning component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespaces {
    pub registry: String,
    pub coverage: String,
    pub runs: String,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            registry: "registry".into(),
            coverage: "coverage".into(),
            runs: "runs".into(),
        }
    }
}

/// Kind names for every record type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindNames {
    pub group: String,
    pub component: String,
    pub version: String,
    pub coverage_run: String,
    pub organization: String,
    pub coverage_component: String,
    pub coverage_version: String,
    pub file_coverage: String,
    pub test_run: String,
    pub build: String,
    pub run_component: String,
    pub run_log: String,
}

impl Default for KindNames {
    fn default() -> Self {
        Self {
            group: "Group".into(),
            component: "Component".into(),
            version: "Version".into(),
            coverage_run: "CoverageTest".into(),
            organization: "Organization".into(),
            coverage_component: "Component".into(),
            coverage_version: "Version".into(),
            file_coverage: "ComponentVersionCoverageResult".into(),
            test_run: "TestRun".into(),
            build: "Build".into(),
            run_component: "RunComponent".into(),
            run_log: "RunLog".into(),
        }
    }
}

impl KindNames {
    fn all(&self) -> [(&'static str, &str); 12] {
        [
            ("group", self.group.as_str()),
            ("component", self.component.as_str()),
            ("version", self.version.as_str()),
            ("coverage_run", self.coverage_run.as_str()),
            ("organization", self.organization.as_str()),
            ("coverage_component", self.coverage_component.as_str()),
            ("coverage_version", self.coverage_version.as_str()),
            ("file_coverage", self.file_coverage.as_str()),
            ("test_run", self.test_run.as_str()),
            ("build", self.build.as_str()),
            ("run_component", self.run_component.as_str()),
            ("run_log", self.run_log.as_str()),
        ]
    }
}

/// Limits applied to every listing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 25,
            max_limit: 500,
        }
    }
}

impl PaginationConfig {
    /// Effective page size for a requested limit. `None` or `0` means the default.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.default_limit,
            Some(n) => n.min(self.max_limit),
        }
    }
}

impl GaugeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: GaugeConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject empty namespaces or kind names, clashing run kinds, and bad page limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, ns) in [
            ("registry", &self.namespaces.registry),
            ("coverage", &self.namespaces.coverage),
            ("runs", &self.namespaces.runs),
        ] {
            if ns.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "namespaces.{field} must not be empty"
                )));
            }
        }
        for (field, kind) in self.kinds.all() {
            if kind.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "kinds.{field} must not be empty"
                )));
            }
        }
        if self.kinds.test_run == self.kinds.build {
            return Err(ConfigError::Invalid(
                "kinds.test_run and kinds.build must differ".into(),
            ));
        }
        let p = &self.pagination;
        if p.max_limit == 0 || p.default_limit == 0 {
            return Err(ConfigError::Invalid(
                "pagination limits must be positive".into(),
            ));
        }
        if p.default_limit > p.max_limit {
            return Err(ConfigError::Invalid(format!(
                "pagination.default_limit ({}) exceeds max_limit ({})",
                p.default_limit, p.max_limit
            )));
        }
        Ok(())
    }
}
