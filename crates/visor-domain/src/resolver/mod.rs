//! Permission-filtered listing across object types.
//!
//! The resolver answers "which objects may this caller see" by issuing one
//! bounded list query per object type and merging the results into a single
//! page. Each type paginates independently; their cursors travel together in
//! one composite continuation token (see [`crate::pagination`]).
//!
//! # Flow
//!
//! ```text
//! token ─decode─▶ cursors ─▶ [(type, relation, cursor), ...]
//!                                   │ one job per type
//!                                   ▼
//!                             Dispatcher ─▶ ResultCollector::take(n)
//!                                   │
//!                  merge in type order, collect next cursors ─encode─▶ token
//! ```
//!
//! # Consistency
//!
//! Pages are all-or-nothing: if any per-type query fails (including a
//! panicking job) the whole page fails with [`DomainError::StoreQuery`].
//! A page never silently omits a type.
//!
//! A malformed inbound token is treated as no token at all, so the caller
//! gets the first page rather than an error.
//!
//! [`DomainError::StoreQuery`]: crate::error::DomainError::StoreQuery

mod config;
mod permission_resolver;
mod traits;
mod types;

pub use config::{ResolverConfig, DEFAULT_OBJECT_TYPES};
pub use permission_resolver::PermissionResolver;
pub use traits::ObjectLister;
pub use types::{ObjectPage, QueryFilter, ResolveRequest, ResolvedPage, TypeScope};

/// Histogram of listing latency, labelled by `scope`.
pub const LISTING_DURATION: &str = "visor_listing_duration_seconds";
/// Counter of objects returned by listings.
pub const LISTING_ITEMS_TOTAL: &str = "visor_listing_items_total";

/// Registers descriptions for the listing metrics.
pub fn describe_metrics() {
    metrics::describe_histogram!(
        LISTING_DURATION,
        metrics::Unit::Seconds,
        "Time to resolve one listing page"
    );
    metrics::describe_counter!(LISTING_ITEMS_TOTAL, "Objects returned by listings");
}

#[cfg(test)]
mod tests;
