//! Prometheus metrics infrastructure.
//!
//! Uses the `metrics` facade with `metrics-exporter-prometheus` for exposition.
//!
//! # Metrics Exposed
//!
//! - `visor_http_requests_total` / `visor_http_request_duration_seconds`
//! - `visor_dispatcher_jobs_total{outcome}` / `visor_dispatcher_queue_depth`
//! - `visor_listing_duration_seconds{scope}` / `visor_listing_items_total`

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared state containing the Prometheus handle for metrics rendering.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder and registers metric descriptions.
///
/// Must be called once at startup, before anything records.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_metric_descriptions();

    Ok(MetricsState::new(handle))
}

/// Describes every metric the service records.
pub fn register_metric_descriptions() {
    crate::middleware::describe_metrics();
    visor_domain::dispatcher::describe_metrics();
    visor_domain::resolver::describe_metrics();
}

/// Prometheus exposition format content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_recorder_renders_recorded_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = MetricsState::new(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(visor_domain::resolver::LISTING_ITEMS_TOTAL).increment(3);
        });

        assert!(state.render().contains("visor_listing_items_total 3"));
    }
}
