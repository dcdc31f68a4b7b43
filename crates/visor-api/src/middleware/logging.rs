//! Request logging middleware.
//!
//! Wraps each request in an `http_request` span carrying the request id and
//! logs start and completion under the `visor::http` target.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{field::Empty, info, info_span, Instrument, Span};

use super::request_id::RequestId;

/// Layer that logs HTTP requests and responses.
#[derive(Clone, Default)]
pub struct RequestLoggingLayer;

impl RequestLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggingService<S>
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
        let method = request.method().clone();
        let uri = request.uri().clone();
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();

        let span = info_span!(
            "http_request",
            method = %method,
            uri = %uri,
            request_id = %request_id,
            status = Empty,
        );

        let start = Instant::now();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                info!(target: "visor::http", "request started");

                let response = inner.call(request).await?;
                let status = response.status().as_u16();
                Span::current().record("status", status);

                info!(
                    target: "visor::http",
                    status,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "request completed"
                );
                Ok(response)
            }
            .instrument(span),
        )
    }
}
