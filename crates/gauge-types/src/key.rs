//! Hierarchical record keys.
//!
//! A [`Key`] is an optional namespace plus a non-empty path of
//! `(kind, name)` pairs. Every prefix of the path is the key of an ancestor;
//! the first element identifies the entity group the key belongs to.
//!
//! [`KeyBuilder`] turns human-readable names into keys using the naming
//! constants from [`GaugeConfig`](crate::GaugeConfig).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{GaugeConfig, KindNames, Namespaces};
use crate::error::TypeError;
use crate::slug::try_slug;

/// One `(kind, name)` segment of a key path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    pub name: String,
}

impl PathElement {
    fn new(kind: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        let kind = kind.into();
        let name = name.into();
        if kind.is_empty() {
            return Err(TypeError::InvalidKey("kind must not be empty".into()));
        }
        if name.is_empty() {
            return Err(TypeError::InvalidKey(format!(
                "name for kind {kind} must not be empty"
            )));
        }
        Ok(Self { kind, name })
    }
}

#[derive(Deserialize)]
struct RawKey {
    namespace: Option<String>,
    path: Vec<PathElement>,
}

/// Address of a stored record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawKey")]
pub struct Key {
    namespace: Option<String>,
    path: Vec<PathElement>,
}

impl TryFrom<RawKey> for Key {
    type Error = TypeError;

    fn try_from(raw: RawKey) -> Result<Self, Self::Error> {
        Key::from_path(raw.namespace, raw.path)
    }
}

impl Key {
    /// A top-level key with no ancestors.
    pub fn root(
        namespace: Option<&str>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        Ok(Self {
            namespace: namespace.map(str::to_string),
            path: vec![PathElement::new(kind, name)?],
        })
    }

    /// Build a key from an explicit path, validating every segment.
    pub fn from_path(
        namespace: Option<String>,
        path: Vec<PathElement>,
    ) -> Result<Self, TypeError> {
        if path.is_empty() {
            return Err(TypeError::InvalidKey("key path must not be empty".into()));
        }
        let path = path
            .into_iter()
            .map(|el| PathElement::new(el.kind, el.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { namespace, path })
    }

    /// A key one level below `self`.
    pub fn child(
        &self,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let mut path = self.path.clone();
        path.push(PathElement::new(kind, name)?);
        Ok(Self {
            namespace: self.namespace.clone(),
            path,
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    fn terminal(&self) -> &PathElement {
        // Constructors reject empty paths.
        &self.path[self.path.len() - 1]
    }

    /// Kind of the terminal segment.
    pub fn kind(&self) -> &str {
        &self.terminal().kind
    }

    /// Name of the terminal segment; surfaced as a record's `id`.
    pub fn name(&self) -> &str {
        &self.terminal().name
    }

    /// The immediate ancestor, or `None` for a root key.
    pub fn parent(&self) -> Option<Key> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self {
            namespace: self.namespace.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Root of the entity group this key belongs to.
    pub fn group_root(&self) -> Key {
        Self {
            namespace: self.namespace.clone(),
            path: self.path[..1].to_vec(),
        }
    }

    /// `true` if `ancestor` is a strict prefix of this key.
    pub fn is_descendant_of(&self, ancestor: &Key) -> bool {
        self.namespace == ancestor.namespace
            && self.path.len() > ancestor.path.len()
            && self.path.starts_with(&ancestor.path)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{ns}#")?;
        }
        for (i, el) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}:{}", el.kind, el.name)?;
        }
        Ok(())
    }
}

/// Builds every key the engine uses from human-readable names.
#[derive(Clone, Debug)]
pub struct KeyBuilder {
    namespaces: Namespaces,
    kinds: KindNames,
}

impl KeyBuilder {
    /// Builder using the namespaces and kind names in `config`.
    pub fn new(config: &GaugeConfig) -> Self {
        Self {
            namespaces: config.namespaces.clone(),
            kinds: config.kinds.clone(),
        }
    }

    pub fn kinds(&self) -> &KindNames {
        &self.kinds
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    fn registry_ns(&self) -> Option<&str> {
        Some(self.namespaces.registry.as_str())
    }

    fn coverage_ns(&self) -> Option<&str> {
        Some(self.namespaces.coverage.as_str())
    }

    fn runs_ns(&self) -> Option<&str> {
        Some(self.namespaces.runs.as_str())
    }

    /// `[Group, slug(group)]`
    pub fn group(&self, group: &str) -> Result<Key, TypeError> {
        Key::root(self.registry_ns(), &self.kinds.group, try_slug(group)?)
    }

    /// `[Group, slug(group), Component, slug(name)]`
    pub fn component(&self, group: &str, name: &str) -> Result<Key, TypeError> {
        self.group(group)?
            .child(&self.kinds.component, try_slug(name)?)
    }

    /// `[...Component, Version, version]`
    pub fn version(&self, group: &str, component: &str, version: &str) -> Result<Key, TypeError> {
        self.component(group, component)?
            .child(&self.kinds.version, version)
    }

    /// `[CoverageTest, run_id]`
    pub fn coverage_run(&self, run_id: &str) -> Result<Key, TypeError> {
        Key::root(self.coverage_ns(), &self.kinds.coverage_run, run_id)
    }

    /// `[Organization, org, Component, component]`
    pub fn coverage_component(&self, component: &str, org: &str) -> Result<Key, TypeError> {
        Key::root(self.coverage_ns(), &self.kinds.organization, org)?
            .child(&self.kinds.coverage_component, component)
    }

    /// `[Organization, org, Component, component, Version, version]`
    pub fn coverage_version(
        &self,
        component: &str,
        org: &str,
        version: &str,
    ) -> Result<Key, TypeError> {
        self.coverage_component(component, org)?
            .child(&self.kinds.coverage_version, version)
    }

    /// `[...Version, ComponentVersionCoverageResult, file]`
    pub fn file_coverage(
        &self,
        component: &str,
        org: &str,
        version: &str,
        file: &str,
    ) -> Result<Key, TypeError> {
        self.coverage_version(component, org, version)?
            .child(&self.kinds.file_coverage, file)
    }

    /// `[kind, run_id]` in the runs namespace.
    pub fn run(&self, kind: &str, run_id: &str) -> Result<Key, TypeError> {
        Key::root(self.runs_ns(), kind, run_id)
    }

    /// `[...run, RunComponent, name]`
    pub fn run_component(&self, run: &Key, name: &str) -> Result<Key, TypeError> {
        run.child(&self.kinds.run_component, name)
    }

    /// `[...run, RunLog, id]`
    pub fn run_log(&self, run: &Key, id: &str) -> Result<Key, TypeError> {
        run.child(&self.kinds.run_log, id)
    }
}
