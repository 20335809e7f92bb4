//! The backing store contract.
//!
//! Gauge does not implement a database; it is handed a [`Store`]. A store
//! offers single-key reads and writes, ordered ancestor-scoped queries with
//! resumable cursors, and multi-key transactions.

use async_trait::async_trait;
use gauge_types::Key;

use crate::cursor::Cursor;
use crate::entity::Entity;
use crate::error::StoreResult;
use crate::query::Query;

/// Result of one query call.
#[derive(Clone, Debug, Default)]
pub struct QueryResults {
    pub entities: Vec<Entity>,
    /// Position after the last returned entity.
    pub end_cursor: Option<Cursor>,
    /// `true` if at least one more matching entity follows `end_cursor`.
    pub more_results: bool,
}

/// Hierarchical document store.
///
/// Implementations must be thread-safe. `put_many` and `delete_many` apply
/// atomically. Reads outside a transaction may observe any committed state.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read one entity. Returns `Ok(None)` if absent.
    async fn get(&self, key: &Key) -> StoreResult<Option<Entity>>;

    /// Read several entities, preserving input order.
    async fn get_many(&self, keys: &[Key]) -> StoreResult<Vec<Option<Entity>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// Create or replace one entity.
    async fn put(&self, entity: Entity) -> StoreResult<()>;

    /// Create or replace several entities atomically.
    async fn put_many(&self, entities: Vec<Entity>) -> StoreResult<()>;

    /// Delete one entity. Returns `true` if it existed.
    async fn delete(&self, key: &Key) -> StoreResult<bool>;

    /// Delete several entities atomically. Returns how many existed.
    async fn delete_many(&self, keys: &[Key]) -> StoreResult<usize>;

    /// Run an ordered query, honoring `limit` and `start`.
    async fn run_query(&self, query: &Query) -> StoreResult<QueryResults>;

    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// An open transaction.
///
/// Reads observe committed state (not the transaction's own staged writes)
/// and are remembered; `commit` fails with
/// [`StoreError::Conflict`](crate::StoreError::Conflict) if any of them
/// changed in the meantime. Writes are staged and become visible together
/// on commit. Dropping a transaction without committing discards it.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, key: &Key) -> StoreResult<Option<Entity>>;

    /// Stage a create-or-replace.
    fn put(&mut self, entity: Entity) -> StoreResult<()>;

    /// Stage a delete.
    fn delete(&mut self, key: Key) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
