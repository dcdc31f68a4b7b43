//! Tests for the permission resolver.
//!
//! Organized by functionality:
//! - Preconditions (identity, type validation)
//! - Single-type listing
//! - Fan-out and merge
//! - Continuation tokens
//! - Failure handling (store errors, panics, timeouts, backpressure)
