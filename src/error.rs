use thiserror::Error;

use crate::backend::BackendError;
use crate::record::RecordId;

/// Errors reported by [`Store`](crate::Store) operations.
///
/// None of these are fatal: after any error the store's observable state is
/// exactly what it was before the call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad input: empty title, malformed reorder set.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation targeted an id the store does not hold.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// The durable write did not complete.
    #[error("persistence failed: {0}")]
    Persistence(#[from] BackendError),

    /// Every rank value above the current maximum is taken.
    #[error("rank space exhausted; ranks need renormalizing")]
    RankExhausted,
}

impl StoreError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, StoreError::Persistence(_))
    }
}
