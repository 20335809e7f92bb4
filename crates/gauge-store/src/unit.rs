//! Atomic unit of work.
//!
//! A [`UnitOfWork`] scopes one transaction: begin, read what is needed,
//! stage writes, then either commit or roll back. The guard owns the
//! transaction, so an early return (including `?`) drops it and the staged
//! writes never land.
//!
//! ```ignore
//! let mut uow = UnitOfWork::begin(store, "start-run").await?;
//! let outcome = mutate(&mut uow).await;
//! uow.complete(outcome).await
//! ```
//!
//! [`UnitOfWork::run`] is the closure form of the same sequence.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

use gauge_types::Key;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::mapper::{to_entity, to_record, Record};
use crate::traits::{Store, StoreTransaction};

/// Future returned by a [`UnitOfWork::run`] body.
pub type UnitFuture<'u, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'u>>;

pub struct UnitOfWork {
    tx: Option<Box<dyn StoreTransaction>>,
    label: &'static str,
    staged: usize,
}

impl UnitOfWork {
    /// Open a transaction on `store`. `label` names the unit in logs.
    pub async fn begin(store: &dyn Store, label: &'static str) -> StoreResult<Self> {
        let tx = store.begin().await?;
        Ok(Self {
            tx: Some(tx),
            label,
            staged: 0,
        })
    }

    /// Run `body` in a fresh unit: commit if it returns `Ok`, roll back
    /// and return its error otherwise.
    pub async fn run<T, E, F>(store: &dyn Store, label: &'static str, body: F) -> Result<T, E>
    where
        E: From<StoreError> + Display,
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> UnitFuture<'u, T, E>,
    {
        let mut uow = Self::begin(store, label).await?;
        let outcome = body(&mut uow).await;
        uow.complete(outcome).await
    }

    fn tx(&mut self) -> StoreResult<&mut Box<dyn StoreTransaction>> {
        self.tx.as_mut().ok_or(StoreError::TransactionClosed)
    }

    /// Read committed state at `key`; the read is checked at commit.
    pub async fn get(&mut self, key: &Key) -> StoreResult<Option<Entity>> {
        self.tx()?.get(key).await
    }

    /// Read and map a record. Returns `Ok(None)` if absent.
    pub async fn get_record<T: DeserializeOwned>(&mut self, key: &Key) -> StoreResult<Option<T>> {
        match self.get(key).await? {
            Some(entity) => to_record(entity).map(Some),
            None => Ok(None),
        }
    }

    /// Stage a write. Nothing is visible until [`commit`](Self::commit).
    pub fn put(&mut self, entity: Entity) -> StoreResult<()> {
        self.tx()?.put(entity)?;
        self.staged += 1;
        Ok(())
    }

    /// Stage a record write using its type's unindexed list.
    pub fn put_record<T: Record>(&mut self, key: Key, record: &T) -> StoreResult<()> {
        let entity = to_entity(key, record)?;
        self.put(entity)
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: Key) -> StoreResult<()> {
        self.tx()?.delete(key)?;
        self.staged += 1;
        Ok(())
    }

    /// Number of writes and deletes staged so far.
    pub fn staged(&self) -> usize {
        self.staged
    }

    /// Apply every staged write atomically.
    ///
    /// Fails with [`StoreError::Conflict`] if anything read here changed
    /// since, in which case nothing is applied.
    pub async fn commit(mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        let staged = self.staged;
        tx.commit().await?;
        debug!(unit = self.label, staged, "unit of work committed");
        Ok(())
    }

    /// Discard staged writes.
    pub async fn rollback(mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        debug!(unit = self.label, staged = self.staged, "unit of work rolled back");
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`.
    ///
    /// The caller's error is returned unchanged; a failing rollback is only
    /// logged. A failing commit surfaces as the commit error.
    pub async fn complete<T, E>(self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError> + Display,
    {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let label = self.label;
                if let Err(rollback_err) = self.rollback().await {
                    warn!(unit = label, error = %rollback_err, "rollback failed");
                }
                debug!(unit = label, error = %err, "unit of work aborted");
                Err(err)
            }
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(
                unit = self.label,
                staged = self.staged,
                "unit of work dropped without commit; staged writes discarded"
            );
        }
    }
}
