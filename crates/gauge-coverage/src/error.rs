use gauge_store::StoreError;
use gauge_types::TypeError;
use thiserror::Error;

use crate::models::RunStatus;

/// Errors from coverage run and rollup operations.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Input rejected before any store call.
    #[error("validation error: {0}")]
    Validation(String),

    /// The run is not in a status the operation may leave.
    #[error("invalid run transition from {from} to {to}")]
    InvalidStateTransition { from: RunStatus, to: RunStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TypeError> for CoverageError {
    fn from(err: TypeError) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type CoverageResult<T> = Result<T, CoverageError>;
