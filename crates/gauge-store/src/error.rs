use gauge_types::TypeError;
use thiserror::Error;

/// Errors from backing store operations.
///
/// Any of these raised inside a unit of work rolls the whole unit back.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key read inside a transaction changed before the transaction committed.
    #[error("transaction conflict on {key}")]
    Conflict { key: String },

    /// The backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A page token could not be decoded or does not fit the query.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// A record could not be mapped to or from its stored form.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),

    /// The transaction was already committed or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
