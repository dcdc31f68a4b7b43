//! Request handlers.

pub mod listing;
