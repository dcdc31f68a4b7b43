//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Query against the permission store failed.
    #[error("permission store query error: {message}")]
    QueryError { message: String },

    /// The permission store could not be reached.
    #[error("permission store connection error: {message}")]
    ConnectionError { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A per-type cursor handed to the store was not produced by it.
    #[error("invalid continuation_token: {message}")]
    InvalidContinuationToken { message: String },

    /// Request or response body could not be (de)serialized.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// The store did not answer within the configured timeout.
    #[error("permission store operation timed out: {operation}")]
    Timeout { operation: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionError { .. } | StorageError::Timeout { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
