use gauge_store::StoreError;
use gauge_types::TypeError;
use thiserror::Error;

/// Errors from component registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Input rejected before any store call.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TypeError> for RegistryError {
    fn from(err: TypeError) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
