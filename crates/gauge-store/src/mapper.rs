//! Conversion between stored entities and typed records.
//!
//! Records are flat serde structs with an `id` field. The `id` is never
//! persisted as a property: [`to_record`] derives it from the terminal key
//! segment and [`to_store_write`] drops it. Properties whose names start
//! with [`INTERNAL_PREFIX`] are store-side bookkeeping and never reach a
//! record.

use gauge_types::Key;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};

/// Name of the derived identifier field on every record.
pub const ID_FIELD: &str = "id";

/// Prefix reserved for internal properties such as index hints.
pub const INTERNAL_PREFIX: &str = "__";

/// A typed record persisted as one entity.
pub trait Record: Serialize + DeserializeOwned {
    /// Properties excluded from secondary indexes (large or low-cardinality text).
    const UNINDEXED: &'static [&'static str] = &[];
}

/// Map a stored entity to a flat record, injecting `id` from the key.
pub fn to_record<T: DeserializeOwned>(entity: Entity) -> StoreResult<T> {
    let Entity {
        key, properties, ..
    } = entity;
    let mut flat: serde_json::Map<String, Value> = properties
        .into_iter()
        .filter(|(name, _)| !name.starts_with(INTERNAL_PREFIX))
        .collect();
    flat.insert(ID_FIELD.to_string(), Value::String(key.name().to_string()));
    serde_json::from_value(Value::Object(flat))
        .map_err(|e| StoreError::Serialization(format!("decoding {key}: {e}")))
}

/// Map a record to the entity written under `key`.
pub fn to_store_write<T: Serialize>(
    key: Key,
    record: &T,
    unindexed: &[&str],
) -> StoreResult<Entity> {
    let value = serde_json::to_value(record)
        .map_err(|e| StoreError::Serialization(format!("encoding {key}: {e}")))?;
    let Value::Object(mut properties) = value else {
        return Err(StoreError::Serialization(format!(
            "record for {key} did not serialize to an object"
        )));
    };
    properties.remove(ID_FIELD);
    Ok(Entity::new(key, properties).with_unindexed(unindexed.iter().copied()))
}

/// [`to_store_write`] using the record type's own unindexed list.
pub fn to_entity<T: Record>(key: Key, record: &T) -> StoreResult<Entity> {
    to_store_write(key, record, T::UNINDEXED)
}
