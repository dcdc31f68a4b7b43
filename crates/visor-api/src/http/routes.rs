//! HTTP route definitions and handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequest, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, warn};

use visor_server::auth::Principal;
use visor_server::handlers::listing::{ListError, ListResourcesRequest};
use visor_storage::{PermissionStore, StorageError, StoredTuple};

use super::state::AppState;
use crate::middleware::{
    AuthLayer, MetricsLayer, RequestIdLayer, RequestLoggingLayer, RequestMetrics,
};
use crate::observability::{metrics_handler, MetricsState};
use crate::validation::validate_payload;

/// Request and response header carrying the continuation token.
pub const TOKEN_PAGINATION_HEADER: &str = "x-token-pagination";

/// Default request body size limit (1MB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Custom JSON extractor that returns 400 Bad Request instead of 422
/// Unprocessable Entity for deserialization errors.
///
/// Preserves 413 Payload Too Large for body limit errors.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    Err(ApiError::payload_too_large(rejection.body_text()))
                } else {
                    Err(ApiError::validation_error(rejection.body_text()))
                }
            }
        }
    }
}

/// Routes under `/api/v0`, all behind payload validation.
fn api_routes<S: PermissionStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/api/v0/resources", get(list_resources::<S>))
        .route(
            "/api/v0/tuples",
            post(write_tuples::<S>).delete(delete_tuples::<S>),
        )
        .route("/api/v0/check", post(check::<S>))
        .route("/api/v0/dispatcher", get(dispatcher_stats::<S>))
}

/// Creates the HTTP router: API routes, `/health` and `/ready`, with
/// authentication and the default body size limit.
pub fn create_router<S: PermissionStore>(state: AppState<S>) -> Router {
    let validators = Arc::clone(&state.validators);
    let authenticator = Arc::clone(&state.authenticator);

    api_routes::<S>()
        .layer(middleware::from_fn_with_state(validators, validate_payload))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check::<S>))
        .with_state(Arc::new(state))
        .layer(AuthLayer::new(authenticator))
        .layer(RequestBodyLimitLayer::new(DEFAULT_BODY_LIMIT))
}

/// Options for [`create_router_with_observability`].
#[derive(Clone)]
pub struct RouterOptions {
    /// Path the Prometheus exposition is served on.
    pub metrics_path: String,
    /// Per-request deadline; `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Counters shared with the metrics middleware.
    pub request_metrics: Arc<RequestMetrics>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            metrics_path: "/metrics".to_string(),
            request_timeout: None,
            request_metrics: Arc::new(RequestMetrics::new()),
        }
    }
}

/// Creates the full production router.
///
/// Adds the metrics endpoint and wraps everything in request-id, metrics,
/// logging and (optionally) timeout middleware.
pub fn create_router_with_observability<S: PermissionStore>(
    state: AppState<S>,
    metrics_state: MetricsState,
    options: RouterOptions,
) -> Router {
    let observability_router = Router::new()
        .route(&options.metrics_path, get(metrics_handler))
        .with_state(metrics_state);

    let mut router = create_router(state).merge(observability_router);
    if let Some(timeout) = options.request_timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }
    router
        .layer(RequestLoggingLayer::new())
        .layer(MetricsLayer::new(options.request_metrics))
        .layer(RequestIdLayer::new())
}

// ============================================================
// Error Handling
// ============================================================

/// Error codes returned in [`ApiError::code`].
pub mod error_codes {
    // 400 Bad Request codes
    /// Generic input validation error.
    pub const VALIDATION_ERROR: &str = "validation_error";
    /// Requested object type is not listable.
    pub const TYPE_NOT_FOUND: &str = "type_not_found";
    /// A cursor inside the continuation token was rejected by the store.
    pub const INVALID_CONTINUATION_TOKEN: &str = "invalid_continuation_token";

    // 401
    /// No authenticated principal.
    pub const UNAUTHENTICATED: &str = "unauthenticated";

    // 413
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";

    // 5xx codes
    /// Unexpected internal server error.
    pub const INTERNAL_ERROR: &str = "internal_error";
    /// A permission store query failed.
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    /// Dispatcher saturated or store unreachable.
    pub const SERVICE_UNAVAILABLE: &str = "service_unavailable";
    /// Operation timed out before completion.
    pub const TIMEOUT: &str = "timeout";
}

/// API error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error (400).
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    /// Creates a type not found error (400).
    pub fn type_not_found(message: impl Into<String>) -> Self {
        Self::new(error_codes::TYPE_NOT_FOUND, message)
    }

    /// Creates an invalid continuation token error (400).
    pub fn invalid_continuation_token(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_CONTINUATION_TOKEN, message)
    }

    /// Creates an unauthenticated error (401).
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(error_codes::UNAUTHENTICATED, message)
    }

    /// Creates a payload too large error (413).
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(error_codes::PAYLOAD_TOO_LARGE, message)
    }

    /// Creates an internal error (500).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    /// Creates an upstream error (502).
    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::UPSTREAM_ERROR, message)
    }

    /// Creates a service unavailable error (503).
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(error_codes::SERVICE_UNAVAILABLE, message)
    }

    /// Creates a timeout error (504).
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(error_codes::TIMEOUT, message)
    }

    pub fn status(&self) -> StatusCode {
        use error_codes::*;

        match self.code.as_str() {
            VALIDATION_ERROR | TYPE_NOT_FOUND | INVALID_CONTINUATION_TOKEN => {
                StatusCode::BAD_REQUEST
            }
            UNAUTHENTICATED => StatusCode::UNAUTHORIZED,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            UPSTREAM_ERROR => StatusCode::BAD_GATEWAY,
            SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ListError> for ApiError {
    fn from(err: ListError) -> Self {
        match &err {
            ListError::Unauthorized => ApiError::unauthenticated(err.to_string()),
            ListError::InvalidType { .. } => ApiError::type_not_found(err.to_string()),
            ListError::InvalidCursor { .. } => ApiError::invalid_continuation_token(err.to_string()),
            ListError::Overloaded => {
                warn!("Rejecting listing: dispatcher queue is full");
                ApiError::service_unavailable(err.to_string())
            }
            ListError::Timeout { .. } => ApiError::gateway_timeout(err.to_string()),
            ListError::Upstream {
                object_types,
                message,
            } => {
                error!(?object_types, %message, "Permission store query failed");
                ApiError::upstream_error(err.to_string())
            }
            ListError::Internal { .. } => ApiError::internal_error(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::InvalidInput { message } => ApiError::validation_error(message.clone()),
            StorageError::InvalidContinuationToken { message } => {
                ApiError::invalid_continuation_token(message.clone())
            }
            StorageError::ConnectionError { .. } => {
                error!("Storage unavailable: {}", err);
                ApiError::service_unavailable("permission store unavailable")
            }
            StorageError::Timeout { .. } => {
                error!("Storage timeout: {}", err);
                ApiError::gateway_timeout("permission store operation timed out")
            }
            _ => {
                error!("Storage error: {}", err);
                ApiError::upstream_error("permission store query failed")
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn require_principal(principal: Option<&Extension<Principal>>) -> ApiResult<&Principal> {
    principal
        .map(|Extension(p)| p)
        .ok_or_else(|| ApiError::unauthenticated(ListError::Unauthorized.to_string()))
}

// ============================================================
// Health and Readiness Checks
// ============================================================

/// Liveness probe; does not check dependencies.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: the store answers its health check and the dispatcher
/// accepts jobs. Error details are logged, not returned.
async fn readiness_check<S: PermissionStore>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let storage_ok = match state.storage.health_check().await {
        Ok(()) => true,
        Err(e) => {
            error!(backend = state.storage.backend_name(), "Readiness check failed: {}", e);
            false
        }
    };
    let dispatcher_ok = !state.dispatcher.is_stopped();

    let status = if storage_ok && dispatcher_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let label = |ok: bool| if ok { "ok" } else { "unavailable" };
    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "ready" } else { "not_ready" },
            "checks": {
                "storage": label(storage_ok),
                "dispatcher": label(dispatcher_ok),
            }
        })),
    )
}

/// Snapshot of the worker pool.
async fn dispatcher_stats<S: PermissionStore>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let stats = state.dispatcher.stats();
    Json(serde_json::json!({
        "live_workers": stats.live_workers(),
        "executing": stats.executing(),
        "workers": stats.workers,
        "queue_depth": stats.queue_depth,
        "queue_capacity": stats.queue_capacity,
        "stopped": stats.stopped,
    }))
}

// ============================================================
// Listing
// ============================================================

/// One page of objects the caller may view.
///
/// The continuation token travels in the `X-Token-Pagination` header both
/// ways; the response header is omitted on the last page.
async fn list_resources<S: PermissionStore>(
    State(state): State<Arc<AppState<S>>>,
    principal: Option<Extension<Principal>>,
    headers: HeaderMap,
    Query(mut request): Query<ListResourcesRequest>,
) -> ApiResult<impl IntoResponse> {
    request.continuation_token = headers
        .get(TOKEN_PAGINATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let principal = principal.as_ref().map(|Extension(p)| p);
    let response = state.listing.list(principal, request).await?;

    let mut response_headers = HeaderMap::new();
    if !response.continuation_token.is_empty() {
        match HeaderValue::from_str(&response.continuation_token) {
            Ok(value) => {
                response_headers.insert(TOKEN_PAGINATION_HEADER, value);
            }
            Err(e) => {
                error!(error = %e, "Continuation token is not a valid header value");
                return Err(ApiError::internal_error("internal error"));
            }
        }
    }
    Ok((response_headers, Json(response)))
}

// ============================================================
// Tuple Administration
// ============================================================

/// A relationship tuple on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleKeyBody {
    pub user: String,
    pub relation: String,
    pub object: String,
}

/// Request body for writing or deleting tuples.
#[derive(Debug, Deserialize)]
pub struct TuplesRequestBody {
    pub tuples: Vec<TupleKeyBody>,
}

/// Response for tuple writes and deletes.
#[derive(Debug, Serialize, Deserialize)]
pub struct TuplesResponseBody {
    /// Number of tuples applied.
    pub count: usize,
}

fn parse_tuples(tuples: Vec<TupleKeyBody>) -> ApiResult<Vec<StoredTuple>> {
    tuples
        .iter()
        .enumerate()
        .map(|(index, tk)| {
            StoredTuple::parse(&tk.user, &tk.relation, &tk.object).map_err(|e| {
                ApiError::validation_error(format!("tuples[{index}]: {e}"))
            })
        })
        .collect()
}

async fn write_tuples<S: PermissionStore>(
    State(state): State<Arc<AppState<S>>>,
    principal: Option<Extension<Principal>>,
    JsonBadRequest(body): JsonBadRequest<TuplesRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let principal = require_principal(principal.as_ref())?;
    let tuples = parse_tuples(body.tuples)?;
    let count = tuples.len();

    state.storage.write_tuples(tuples, Vec::new()).await?;

    debug!(subject = %principal.subject, count, "Wrote tuples");
    Ok(Json(TuplesResponseBody { count }))
}

async fn delete_tuples<S: PermissionStore>(
    State(state): State<Arc<AppState<S>>>,
    principal: Option<Extension<Principal>>,
    JsonBadRequest(body): JsonBadRequest<TuplesRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let principal = require_principal(principal.as_ref())?;
    let tuples = parse_tuples(body.tuples)?;
    let count = tuples.len();

    state.storage.delete_tuples(tuples).await?;

    debug!(subject = %principal.subject, count, "Deleted tuples");
    Ok(Json(TuplesResponseBody { count }))
}

/// Request body for a permission check. `user` defaults to the caller.
#[derive(Debug, Deserialize)]
pub struct CheckRequestBody {
    #[serde(default)]
    pub user: Option<String>,
    pub relation: String,
    pub object: String,
}

/// Response for a permission check.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponseBody {
    pub allowed: bool,
}

async fn check<S: PermissionStore>(
    State(state): State<Arc<AppState<S>>>,
    principal: Option<Extension<Principal>>,
    JsonBadRequest(body): JsonBadRequest<CheckRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let principal = require_principal(principal.as_ref())?;
    let user = body.user.unwrap_or_else(|| principal.subject.clone());

    let allowed = state
        .storage
        .check(&user, &body.relation, &body.object)
        .await?;

    Ok(Json(CheckResponseBody { allowed }))
}
