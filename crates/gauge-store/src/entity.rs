//! The store's native record shape: a key plus a property bag.

use std::collections::BTreeSet;

use gauge_types::Key;
use serde_json::{Map, Value};

/// Property bag of a stored entity.
pub type Properties = Map<String, Value>;

/// A stored entity.
///
/// Properties named in `unindexed` are persisted but left out of secondary
/// indexes, so queries can neither filter nor order on them.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub key: Key,
    pub properties: Properties,
    pub unindexed: BTreeSet<String>,
}

impl Entity {
    pub fn new(key: Key, properties: Properties) -> Self {
        Self {
            key,
            properties,
            unindexed: BTreeSet::new(),
        }
    }

    /// Exclude the named properties from indexing.
    pub fn with_unindexed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unindexed.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// The property value as seen by indexes: `None` if absent or unindexed.
    pub fn indexed(&self, property: &str) -> Option<&Value> {
        if self.unindexed.contains(property) {
            return None;
        }
        self.properties.get(property)
    }

    /// The same key with no properties, as returned by keys-only queries.
    pub fn key_only(&self) -> Self {
        Self::new(self.key.clone(), Properties::new())
    }
}
