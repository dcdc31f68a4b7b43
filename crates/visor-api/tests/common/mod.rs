//! Shared test utilities for visor API tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use visor_api::http::{create_router, AppState};
use visor_domain::dispatcher::{Dispatcher, DispatcherConfig};
use visor_domain::resolver::ResolverConfig;
use visor_server::auth::HeaderAuthenticator;
use visor_storage::{MemoryPermissionStore, PermissionStore, StoredTuple};

/// Identity header the test apps trust.
pub const USER_HEADER: &str = "x-user-id";

/// Response status, headers and parsed JSON body.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

pub fn dispatcher(workers: usize, queue_capacity: usize) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(DispatcherConfig::new(workers, queue_capacity)).unwrap())
}

/// Router over `storage` with header authentication.
pub fn create_test_app<S: PermissionStore>(
    storage: Arc<S>,
    dispatcher: Arc<Dispatcher>,
    resolver_config: ResolverConfig,
) -> Router {
    let authenticator = Arc::new(HeaderAuthenticator::new(USER_HEADER).unwrap());
    create_router(AppState::new(
        storage,
        dispatcher,
        resolver_config,
        authenticator,
    ))
}

/// Memory store holding `can_view` tuples for `user` on each object.
pub async fn seeded_store(user: &str, objects: &[&str]) -> Arc<MemoryPermissionStore> {
    let store = MemoryPermissionStore::new_shared();
    let tuples = objects
        .iter()
        .map(|object| StoredTuple::parse(user, "can_view", object).unwrap())
        .collect();
    store.write_tuples(tuples, Vec::new()).await.unwrap();
    store
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::json!({ "raw_body": String::from_utf8_lossy(&bytes).to_string() })
        })
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

/// `GET /api/v0/resources` as `user`, optionally scoped and resumed.
pub async fn list_resources(
    app: Router,
    user: Option<&str>,
    object_type: Option<&str>,
    token: Option<&str>,
) -> TestResponse {
    let uri = match object_type {
        Some(t) => format!("/api/v0/resources?type={t}"),
        None => "/api/v0/resources".to_string(),
    };
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    if let Some(token) = token {
        builder = builder.header("x-token-pagination", token);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

/// JSON request as `user`.
pub async fn json_request(
    app: Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: serde_json::Value,
) -> TestResponse {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    send(
        app,
        builder
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
    )
    .await
}

/// Items of a listing response as strings.
pub fn items(response: &TestResponse) -> Vec<String> {
    response.body["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

/// The response's `X-Token-Pagination` header, if any.
pub fn token_header(response: &TestResponse) -> Option<String> {
    response
        .headers
        .get("x-token-pagination")
        .map(|v| v.to_str().unwrap().to_string())
}
