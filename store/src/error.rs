//! Rate store error types.

use thiserror::Error;

/// Errors that can occur in the rate store.
///
/// Absence of a record is not an error; lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database was unavailable or rejected the operation.
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored value could not be decoded as a rate.
    #[error("corrupt rate for {base}/{target}: {value:?}")]
    Corrupt {
        base: String,
        target: String,
        value: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
