//! Permission-filtered resource listing.
//!
//! The handler is the boundary between transport and the resolver:
//!
//! 1. **Identity**: a request without a [`Principal`](crate::auth::Principal)
//!    fails with [`ListError::Unauthorized`] before any store or dispatcher work.
//! 2. **Scope**: an explicit `type` lists that type directly; no type fans out
//!    over every configured type.
//! 3. **Token**: the inbound continuation token is passed through; a malformed
//!    token yields the first page, never an error.
//! 4. **Response**: items, their count, and the next token (empty when done).

mod handler;
mod types;

pub use handler::ListResourcesHandler;
pub use types::{ListError, ListResourcesRequest, ListResourcesResponse, ListResult};

#[cfg(test)]
mod tests;
