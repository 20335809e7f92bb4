//! Storage layer for Gauge.
//!
//! Gauge persists everything as [`Entity`] values in a hierarchical document
//! store reached through the [`Store`] trait. This crate provides:
//!
//! - the [`Store`] / [`StoreTransaction`] contract,
//! - [`Query`] with filters, ordering, and resumable [`Cursor`]s,
//! - the entity mapper ([`to_record`], [`to_store_write`]),
//! - [`paginate`], which turns a query into one [`Page`] of records,
//! - [`UnitOfWork`], the atomic read-modify-write scope,
//! - [`InMemoryStore`], a complete backend for tests and embedding.

pub mod cursor;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod memory;
pub mod query;
pub mod traits;
pub mod unit;

pub use cursor::{
    collect_keys, paginate, sweep_descendants, Cursor, Page, PageRequest, MAX_CURSOR_SIZE,
};
pub use entity::{Entity, Properties};
pub use error::{StoreError, StoreResult};
pub use mapper::{to_entity, to_record, to_store_write, Record, ID_FIELD, INTERNAL_PREFIX};
pub use memory::InMemoryStore;
pub use query::{Direction, Filter, Order, Query};
pub use traits::{QueryResults, Store, StoreTransaction};
pub use unit::{UnitFuture, UnitOfWork};
