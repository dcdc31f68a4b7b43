//! visor-api: HTTP API layer
//!
//! This crate provides the API layer including:
//! - HTTP REST endpoints via Axum
//! - Storage to domain adapters
//! - Payload validation registry
//! - Middleware (request id, logging, metrics, authentication)
//! - Observability (structured logging, Prometheus)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 visor-api                   │
//! ├─────────────────────────────────────────────┤
//! │  http/          - HTTP REST endpoints       │
//! │  adapters.rs    - PermissionStore lister    │
//! │  validation.rs  - ValidatorRegistry         │
//! │  middleware/    - Auth, metrics, logging    │
//! │  observability/ - Logging + Prometheus      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod http;
pub mod middleware;
pub mod observability;
pub mod validation;
