//! HTTP REST API endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/v0/resources` | GET | Permission-filtered listing (`?type=`, `X-Token-Pagination`) |
//! | `/api/v0/tuples` | POST | Write tuples |
//! | `/api/v0/tuples` | DELETE | Delete tuples |
//! | `/api/v0/check` | POST | Permission check |
//! | `/api/v0/dispatcher` | GET | Worker pool snapshot |
//! | `/health` | GET | Liveness |
//! | `/ready` | GET | Readiness (store health, dispatcher running) |
//! | `/metrics` | GET | Prometheus exposition |

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_observability, ApiError, DEFAULT_BODY_LIMIT,
    TOKEN_PAGINATION_HEADER,
};
pub use state::AppState;

#[cfg(test)]
mod tests;
