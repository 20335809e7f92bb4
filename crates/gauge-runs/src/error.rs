use gauge_store::StoreError;
use gauge_types::TypeError;
use thiserror::Error;

use crate::models::RunStatus;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid run transition from {from} to {to}")]
    InvalidStateTransition { from: RunStatus, to: RunStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TypeError> for RunError {
    fn from(err: TypeError) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type RunResult<T> = Result<T, RunError>;
