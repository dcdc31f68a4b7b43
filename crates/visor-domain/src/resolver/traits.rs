//! Store capability needed by the resolver.

use async_trait::async_trait;

use crate::error::DomainResult;

use super::types::{ObjectPage, QueryFilter};

/// Lists objects of one type that a subject holds a relation on.
///
/// Called from several dispatcher workers at once, so implementations must
/// be safe for concurrent use.
#[async_trait]
pub trait ObjectLister: Send + Sync + 'static {
    /// Performs exactly one bounded list call.
    async fn list_objects(&self, subject: &str, filter: &QueryFilter) -> DomainResult<ObjectPage>;
}
