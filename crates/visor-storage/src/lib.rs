//! visor-storage: Permission store abstraction
//!
//! This crate provides the relation-based permission store capability that the
//! rest of visor consumes, including:
//! - `PermissionStore` trait (check / read / list / write / delete tuples)
//! - In-memory implementation for tests and local runs
//! - OpenFGA HTTP implementation for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               visor-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs  - PermissionStore + tuple types │
//! │  memory.rs  - In-memory implementation      │
//! │  openfga.rs - OpenFGA HTTP client           │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod openfga;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryPermissionStore;
pub use openfga::{OpenFgaConfig, OpenFgaStore};
pub use traits::{
    format_user, parse_object, parse_user, ListObjectsFilter, ObjectPage, PaginatedResult,
    PaginationOptions, PermissionFilter, PermissionPage, PermissionStore, StoredTuple,
    TupleCursor, TupleFilter, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
