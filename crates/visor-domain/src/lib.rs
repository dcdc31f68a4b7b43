//! visor-domain: Permission-filtered listing core
//!
//! This crate contains the listing machinery:
//! - Composite continuation tokens
//! - A bounded worker pool with backpressure and graceful shutdown
//! - The fan-out/merge permission resolver
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                visor-domain                  │
//! ├─────────────────────────────────────────────┤
//! │  pagination/ - Composite cursor codec       │
//! │  dispatcher/ - Bounded worker pool          │
//! │  resolver/   - Fan-out/merge listing        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod dispatcher;
pub mod error;
pub mod pagination;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DomainError, DomainResult};
pub use pagination::{TokenError, TokenPaginator};
pub use resolver::{ObjectLister, PermissionResolver, ResolverConfig};
