//! Domain error types for permission listing.

use thiserror::Error;

use crate::dispatcher::{CollectError, DispatchError};

/// Domain-specific errors for listing operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No authenticated caller identity was supplied.
    #[error("unauthorized: no caller identity")]
    Unauthorized,

    /// Requested object type is not one of the listable types.
    #[error("unknown object type: {object_type}")]
    UnknownObjectType { object_type: String },

    /// One or more per-type store queries failed; the page is discarded.
    #[error("permission store query failed for [{}]: {message}", object_types.join(", "))]
    StoreQuery {
        object_types: Vec<String>,
        message: String,
    },

    /// The store rejected a per-type cursor carried in the continuation token.
    #[error("invalid cursor for object type '{object_type}': {message}")]
    InvalidCursor {
        object_type: String,
        message: String,
    },

    /// The dispatcher refused the work.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Results stopped arriving before every job reported back.
    #[error(transparent)]
    Collect(#[from] CollectError),

    /// Fan-out did not complete within the configured deadline.
    #[error("timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
