//! HTTP request metrics.
//!
//! # Metrics Emitted
//!
//! - `visor_http_requests_total` - Counter with labels: method, path, status_class
//! - `visor_http_request_duration_seconds` - Histogram with the same labels

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    extract::MatchedPath,
    http::{Request, Response},
};
use tower::{Layer, Service};

pub const HTTP_REQUESTS_TOTAL: &str = "visor_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "visor_http_request_duration_seconds";

/// Registers descriptions for the HTTP metrics.
pub fn describe_metrics() {
    metrics::describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests");
    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION,
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );
}

/// Request counters kept alongside the exported metrics so tests can read
/// them back without a recorder.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed request.
    pub fn record(&self, method: &str, path: &str, status: u16, seconds: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let status_class = match status {
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => {
                self.client_errors.fetch_add(1, Ordering::Relaxed);
                "4xx"
            }
            500..=599 => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
                "5xx"
            }
            _ => "other",
        };

        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status_class", status_class.to_string()),
        ];
        metrics::counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
        metrics::histogram!(HTTP_REQUEST_DURATION, &labels).record(seconds);
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn client_error_count(&self) -> u64 {
        self.client_errors.load(Ordering::Relaxed)
    }

    pub fn server_error_count(&self) -> u64 {
        self.server_errors.load(Ordering::Relaxed)
    }
}

/// Layer that collects request metrics.
#[derive(Clone, Default)]
pub struct MetricsLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let method = request.method().to_string();
        // Matched route pattern keeps label cardinality bounded.
        let path = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "unmatched".to_string());
        let metrics = Arc::clone(&self.metrics);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(request).await?;
            metrics.record(
                &method,
                &path,
                response.status().as_u16(),
                start.elapsed().as_secs_f64(),
            );
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_classifies_status() {
        let metrics = RequestMetrics::new();
        metrics.record("GET", "/api/v0/resources", 200, 0.01);
        metrics.record("GET", "/api/v0/resources", 401, 0.001);
        metrics.record("GET", "/api/v0/resources", 503, 0.002);

        assert_eq!(metrics.request_count(), 3);
        assert_eq!(metrics.client_error_count(), 1);
        assert_eq!(metrics.server_error_count(), 1);
    }
}
