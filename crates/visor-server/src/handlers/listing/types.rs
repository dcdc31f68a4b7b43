//! Data types for listing operations.

use serde::{Deserialize, Serialize};
use visor_domain::dispatcher::{CollectError, DispatchError};
use visor_domain::DomainError;

/// Request for one page of the listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResourcesRequest {
    /// Restricts the listing to one object type.
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    /// Continuation token from the previous page.
    #[serde(skip)]
    pub continuation_token: Option<String>,
}

/// One page of the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResourcesResponse {
    /// Objects in `type:id` form.
    pub items: Vec<String>,
    pub count: usize,
    /// Token for the next page; empty when the listing is complete.
    pub continuation_token: String,
}

/// Errors that can occur while listing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListError {
    /// No authenticated caller.
    #[error("authentication required")]
    Unauthorized,

    /// The requested type is not listable.
    #[error("unknown object type: {object_type}")]
    InvalidType { object_type: String },

    /// The store rejected a cursor inside the continuation token.
    #[error("invalid continuation token: {message}")]
    InvalidCursor { message: String },

    /// The dispatcher queue is saturated.
    #[error("dispatcher queue is full")]
    Overloaded,

    /// Fan-out exceeded its deadline.
    #[error("listing timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A permission store query failed.
    #[error("permission store unavailable for [{}]", object_types.join(", "))]
    Upstream {
        object_types: Vec<String>,
        message: String,
    },

    /// Internal error; details are logged, not returned.
    #[error("internal error")]
    Internal { message: String },
}

impl From<DomainError> for ListError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Unauthorized => ListError::Unauthorized,
            DomainError::UnknownObjectType { object_type } => ListError::InvalidType { object_type },
            DomainError::InvalidCursor {
                object_type,
                message,
            } => ListError::InvalidCursor {
                message: format!("{object_type}: {message}"),
            },
            DomainError::StoreQuery {
                object_types,
                message,
            } => ListError::Upstream {
                object_types,
                message,
            },
            DomainError::Dispatch(DispatchError::QueueFull { .. }) => ListError::Overloaded,
            DomainError::Timeout { duration_ms } => ListError::Timeout { duration_ms },
            DomainError::Dispatch(e @ (DispatchError::Stopped | DispatchError::InvalidConfig { .. })) => {
                ListError::Internal {
                    message: e.to_string(),
                }
            }
            DomainError::Collect(e @ CollectError::SinkClosed { .. }) => ListError::Internal {
                message: e.to_string(),
            },
            DomainError::Internal { message } => ListError::Internal { message },
        }
    }
}

/// Result type for listing operations.
pub type ListResult<T> = Result<T, ListError>;
