//! API middleware.
//!
//! Includes:
//! - Request ID generation
//! - Request logging
//! - Metrics collection
//! - Authentication

mod auth;
mod logging;
mod metrics;
mod request_id;

pub use auth::AuthLayer;
pub use logging::RequestLoggingLayer;
pub use metrics::{
    describe_metrics, MetricsLayer, RequestMetrics, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION,
};
pub use request_id::{RequestId, RequestIdLayer, REQUEST_ID_HEADER};
