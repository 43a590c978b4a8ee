//! Rate engine error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while fetching rates from an upstream source.
///
/// A batch fetch fails as a whole; there is no partial result. A currency
/// the upstream simply does not know is not an error; it yields a
/// rate-less [`Conversion`](crate::Conversion).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never completed (DNS, connect, TLS, body read).
    #[error("rate request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("rate source returned {status}")]
    Status { status: StatusCode },

    /// The response body did not match the expected schema.
    #[error("malformed rate payload: {0}")]
    Malformed(String),

    /// A non-HTTP source failed.
    #[error("rate source error: {0}")]
    Source(String),
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
