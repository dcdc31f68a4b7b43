//! OpenFGA backend tests against a mocked HTTP API.

use std::time::Duration;

use serde_json::json;
use visor_storage::{
    ListObjectsFilter, OpenFgaConfig, OpenFgaStore, PaginationOptions, PermissionStore,
    StorageError, StoredTuple, TupleFilter,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STORE_ID: &str = "01HSTORE";

fn create_store(uri: &str) -> OpenFgaStore {
    let mut config = OpenFgaConfig::new(uri, STORE_ID);
    config.api_token = Some("secret".to_string());
    config.timeout = Duration::from_millis(500);
    OpenFgaStore::new(config).unwrap()
}

fn read_response(objects: &[&str], token: &str) -> serde_json::Value {
    let tuples: Vec<_> = objects
        .iter()
        .map(|object| {
            json!({
                "key": { "user": "user:alice", "relation": "can_view", "object": object },
                "timestamp": "2024-01-01T00:00:00Z"
            })
        })
        .collect();
    json!({ "tuples": tuples, "continuation_token": token })
}

#[tokio::test]
async fn test_list_objects_sends_type_prefix_and_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/stores/{STORE_ID}/read")))
        .and(header("Authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "tuple_key": { "user": "user:alice", "relation": "can_view", "object": "clients:" },
            "page_size": 2,
            "continuation_token": "abc"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(read_response(&["clients:grafana", "clients:loki"], "def")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    let page = store
        .list_objects(
            "user:alice",
            &ListObjectsFilter {
                object_type: "clients".to_string(),
                relation: "can_view".to_string(),
                continuation_token: Some("abc".to_string()),
                page_size: Some(2),
            },
        )
        .await
        .unwrap();

    assert_eq!(page.objects, vec!["clients:grafana", "clients:loki"]);
    assert_eq!(page.continuation_token.as_deref(), Some("def"));
}

#[tokio::test]
async fn test_empty_upstream_token_means_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/stores/{STORE_ID}/read")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(read_response(&["roles:viewer"], "")),
        )
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    let page = store
        .read_tuples(
            &TupleFilter {
                object_type: Some("roles".to_string()),
                ..Default::default()
            },
            &PaginationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].object_id, "viewer");
    assert!(page.continuation_token.is_none());
}

#[tokio::test]
async fn test_invalid_continuation_token_is_classified() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/stores/{STORE_ID}/read")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "invalid_continuation_token",
            "message": "invalid continuation token"
        })))
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    let result = store
        .read_tuples(
            &TupleFilter {
                object_type: Some("clients".to_string()),
                ..Default::default()
            },
            &PaginationOptions {
                page_size: None,
                continuation_token: Some("garbage".to_string()),
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(StorageError::InvalidContinuationToken { .. })
    ));
}

#[tokio::test]
async fn test_server_error_maps_to_query_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/stores/{STORE_ID}/check")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    let result = store.check("user:alice", "can_view", "clients:grafana").await;
    assert!(matches!(result, Err(StorageError::QueryError { .. })));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/stores/{STORE_ID}/check")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "allowed": true }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    let err = store
        .check("user:alice", "can_view", "clients:grafana")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_check_returns_allowed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/stores/{STORE_ID}/check")))
        .and(body_partial_json(json!({
            "tuple_key": { "user": "user:alice", "relation": "can_view", "object": "clients:grafana" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "allowed": true })))
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    assert!(store
        .check("user:alice", "can_view", "clients:grafana")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_write_omits_empty_sections() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/stores/{STORE_ID}/write")))
        .and(body_partial_json(json!({
            "writes": { "tuple_keys": [
                { "user": "user:alice", "relation": "can_view", "object": "groups:ops" }
            ] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    let tuple = StoredTuple::parse("user:alice", "can_view", "groups:ops").unwrap();
    store.write_tuples(vec![tuple], vec![]).await.unwrap();

    // Nothing to send: no request is made.
    store.write_tuples(vec![], vec![]).await.unwrap();
}

#[tokio::test]
async fn test_health_check_hits_store_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/stores/{STORE_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": STORE_ID })))
        .mount(&server)
        .await;

    let store = create_store(&server.uri());
    assert!(store.health_check().await.is_ok());
    assert_eq!(store.backend_name(), "openfga");
}
