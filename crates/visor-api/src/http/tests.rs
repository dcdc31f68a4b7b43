//! Router and error mapping tests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use visor_domain::dispatcher::{Dispatcher, DispatcherConfig};
use visor_domain::resolver::ResolverConfig;
use visor_server::auth::HeaderAuthenticator;
use visor_server::handlers::listing::ListError;
use visor_storage::{MemoryPermissionStore, StorageError};

use super::routes::error_codes;
use super::*;

fn router() -> (Router, Arc<Dispatcher>) {
    let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::new(2, 8)).unwrap());
    let state = AppState::new(
        MemoryPermissionStore::new_shared(),
        Arc::clone(&dispatcher),
        ResolverConfig::default(),
        Arc::new(HeaderAuthenticator::new("x-user-id").unwrap()),
    );
    (create_router(state), dispatcher)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_list_error_status_mapping() {
    let cases = [
        (ListError::Unauthorized, StatusCode::UNAUTHORIZED),
        (
            ListError::InvalidType {
                object_type: "documents".into(),
            },
            StatusCode::BAD_REQUEST,
        ),
        (
            ListError::InvalidCursor {
                message: "clients: bad".into(),
            },
            StatusCode::BAD_REQUEST,
        ),
        (ListError::Overloaded, StatusCode::SERVICE_UNAVAILABLE),
        (
            ListError::Timeout { duration_ms: 50 },
            StatusCode::GATEWAY_TIMEOUT,
        ),
        (
            ListError::Upstream {
                object_types: vec!["roles".into()],
                message: "connection refused".into(),
            },
            StatusCode::BAD_GATEWAY,
        ),
        (
            ListError::Internal {
                message: "worker gone".into(),
            },
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        let api = ApiError::from(err.clone());
        assert_eq!(api.status(), status, "{err:?}");
    }
}

#[test]
fn test_overloaded_message_and_hidden_details() {
    let api = ApiError::from(ListError::Overloaded);
    assert_eq!(api.code, error_codes::SERVICE_UNAVAILABLE);
    assert_eq!(api.message, "dispatcher queue is full");

    let api = ApiError::from(ListError::Upstream {
        object_types: vec!["roles".into()],
        message: "10.0.0.7:8080 refused".into(),
    });
    assert_eq!(api.code, error_codes::UPSTREAM_ERROR);
    assert!(!api.message.contains("10.0.0.7"));

    let api = ApiError::from(ListError::Internal {
        message: "secret".into(),
    });
    assert!(!api.message.contains("secret"));
}

#[test]
fn test_storage_error_mapping() {
    let api = ApiError::from(StorageError::InvalidInput {
        message: "invalid user format: 'alice'".into(),
    });
    assert_eq!(api.status(), StatusCode::BAD_REQUEST);

    let api = ApiError::from(StorageError::ConnectionError {
        message: "refused".into(),
    });
    assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);

    let api = ApiError::from(StorageError::Timeout {
        operation: "read".into(),
    });
    assert_eq!(api.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = router();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_ready_reports_stopped_dispatcher() {
    let (app, dispatcher) = router();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    dispatcher.stop().await;
    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["checks"]["dispatcher"], "unavailable");
}

#[tokio::test]
async fn test_dispatcher_stats_endpoint() {
    let (app, _) = router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v0/dispatcher")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["workers"].as_array().unwrap().len(), 2);
    assert_eq!(body["queue_capacity"], 8);
    assert_eq!(body["stopped"], false);
}

#[tokio::test]
async fn test_listing_requires_identity() {
    let (app, _) = router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v0/resources")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "unauthenticated");
}
