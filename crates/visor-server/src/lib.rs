//! visor-server: request handling and configuration
//!
//! This crate sits between the HTTP surface and the domain layer:
//! - Listing handler for permission-filtered resources
//! - Caller authentication
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               visor-server                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  auth.rs     - Header and bearer identity   │
//! │  handlers/   - Request handlers             │
//! │    listing/       - Resource listing        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod handlers;

// Re-exports for convenience
pub use auth::{Authenticator, Principal};
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::listing::{
    ListError, ListResourcesHandler, ListResourcesRequest, ListResourcesResponse, ListResult,
};
