//! Types for the permission resolver.

use crate::pagination::TokenPaginator;

/// One per-type list query, built fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub object_type: String,
    pub relation: String,
    /// Cursor from the previous page; `None` starts from the beginning.
    pub starting_cursor: Option<String>,
    pub page_size: u32,
}

/// One bounded page for a single object type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// Objects in `type:id` form, in the store's native order.
    pub objects: Vec<String>,
    /// `None` once this type is exhausted.
    pub next_cursor: Option<String>,
}

/// Which object types a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeScope {
    /// One caller-selected type, queried directly.
    Single(String),
    /// Every known type, queried concurrently.
    All,
}

impl TypeScope {
    /// Label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TypeScope::Single(_) => "single",
            TypeScope::All => "all",
        }
    }
}

/// Request for one page of the unified listing.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Authenticated caller, e.g. `user:alice`. `None` is rejected.
    pub subject: Option<String>,
    pub scope: TypeScope,
    /// Inbound continuation token. Empty or malformed means first page.
    pub continuation_token: String,
}

impl ResolveRequest {
    pub fn new(subject: impl Into<String>, scope: TypeScope) -> Self {
        Self {
            subject: Some(subject.into()),
            scope,
            continuation_token: String::new(),
        }
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = token.into();
        self
    }
}

/// A merged page across the types in scope.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPage {
    /// Objects grouped by type (in configured type order), then store order.
    pub items: Vec<String>,
    /// Next cursor per type that still has more to list.
    pub cursors: TokenPaginator,
}

impl ResolvedPage {
    /// Outgoing continuation token; empty when every type is exhausted.
    pub fn continuation_token(&self) -> String {
        self.cursors.encode()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }
}
