//! Tests for the listing handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use visor_domain::dispatcher::{Dispatcher, DispatcherConfig};
use visor_domain::resolver::{ObjectLister, ObjectPage, PermissionResolver, QueryFilter};
use visor_domain::{DomainError, DomainResult, ResolverConfig, TokenPaginator};

use super::*;
use crate::auth::Principal;

// ========== Test Helpers ==========

/// Serves fixed objects per type; cursors are offsets.
#[derive(Default)]
struct FixedLister {
    objects: HashMap<String, Vec<String>>,
    failing: Option<String>,
    calls: AtomicUsize,
}

impl FixedLister {
    fn with(mut self, object_type: &str, ids: &[&str]) -> Self {
        self.objects.insert(
            object_type.to_string(),
            ids.iter().map(|id| format!("{object_type}:{id}")).collect(),
        );
        self
    }
}

#[async_trait]
impl ObjectLister for FixedLister {
    async fn list_objects(&self, subject: &str, filter: &QueryFilter) -> DomainResult<ObjectPage> {
        assert_eq!(subject, "user:alice");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.as_deref() == Some(filter.object_type.as_str()) {
            return Err(DomainError::StoreQuery {
                object_types: vec![filter.object_type.clone()],
                message: "store unreachable".to_string(),
            });
        }
        let start: usize = filter
            .starting_cursor
            .as_deref()
            .map_or(0, |c| c.parse().unwrap());
        let all = self.objects.get(&filter.object_type).cloned().unwrap_or_default();
        let end = (start + filter.page_size as usize).min(all.len());
        Ok(ObjectPage {
            objects: all[start.min(end)..end].to_vec(),
            next_cursor: (end < all.len()).then(|| end.to_string()),
        })
    }
}

fn handler(lister: FixedLister, page_size: u32) -> (ListResourcesHandler<FixedLister>, Arc<FixedLister>) {
    let lister = Arc::new(lister);
    let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::new(4, 16)).unwrap());
    let resolver = PermissionResolver::new(
        Arc::clone(&lister),
        dispatcher,
        ResolverConfig::default().with_page_size(page_size),
    );
    (ListResourcesHandler::new(Arc::new(resolver)), lister)
}

fn alice() -> Principal {
    Principal::new("alice")
}

fn sample() -> FixedLister {
    FixedLister::default()
        .with("clients", &["grafana", "prometheus"])
        .with("groups", &["admin"])
}

// ========== Section 1: Preconditions ==========

#[tokio::test]
async fn test_missing_principal_is_unauthorized() {
    let (handler, lister) = handler(sample(), 100);

    let result = handler.list(None, ListResourcesRequest::default()).await;

    assert!(matches!(result, Err(ListError::Unauthorized)));
    assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_type_is_invalid() {
    let (handler, _) = handler(sample(), 100);
    let request = ListResourcesRequest {
        object_type: Some("documents".to_string()),
        continuation_token: None,
    };

    let result = handler.list(Some(&alice()), request).await;
    assert!(matches!(result, Err(ListError::InvalidType { .. })));
}

// ========== Section 2: Listing ==========

#[tokio::test]
async fn test_lists_all_types() {
    let (handler, _) = handler(sample(), 100);

    let response = handler
        .list(Some(&alice()), ListResourcesRequest::default())
        .await
        .unwrap();

    assert_eq!(
        response.items,
        vec!["clients:grafana", "clients:prometheus", "groups:admin"]
    );
    assert_eq!(response.count, 3);
    assert_eq!(response.continuation_token, "");
}

#[tokio::test]
async fn test_blank_type_means_all_types() {
    let (handler, lister) = handler(sample(), 100);
    let request = ListResourcesRequest {
        object_type: Some("  ".to_string()),
        continuation_token: None,
    };

    let response = handler.list(Some(&alice()), request).await.unwrap();
    assert_eq!(response.count, 3);
    assert_eq!(lister.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_pages_through_single_type() {
    let (handler, _) = handler(sample(), 1);

    let first = handler
        .list(
            Some(&alice()),
            ListResourcesRequest {
                object_type: Some("clients".to_string()),
                continuation_token: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(first.items, vec!["clients:grafana"]);
    let cursors = TokenPaginator::decode(&first.continuation_token).unwrap();
    assert_eq!(cursors.cursor("clients"), Some("1"));

    let second = handler
        .list(
            Some(&alice()),
            ListResourcesRequest {
                object_type: Some("clients".to_string()),
                continuation_token: Some(first.continuation_token),
            },
        )
        .await
        .unwrap();
    assert_eq!(second.items, vec!["clients:prometheus"]);
    assert_eq!(second.continuation_token, "");
}

#[tokio::test]
async fn test_malformed_token_returns_first_page() {
    let (handler, _) = handler(sample(), 100);
    let request = ListResourcesRequest {
        object_type: None,
        continuation_token: Some("definitely not a token".to_string()),
    };

    let response = handler.list(Some(&alice()), request).await.unwrap();
    assert_eq!(response.count, 3);
}

// ========== Section 3: Error mapping ==========

#[tokio::test]
async fn test_store_failure_maps_to_upstream() {
    let lister = FixedLister {
        failing: Some("groups".to_string()),
        ..sample()
    };
    let (handler, _) = handler(lister, 100);

    let result = handler
        .list(Some(&alice()), ListResourcesRequest::default())
        .await;
    match result {
        Err(ListError::Upstream { object_types, .. }) => assert_eq!(object_types, vec!["groups"]),
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[test]
fn test_domain_error_mapping() {
    use visor_domain::dispatcher::DispatchError;

    assert!(matches!(
        ListError::from(DomainError::Dispatch(DispatchError::QueueFull { capacity: 8 })),
        ListError::Overloaded
    ));
    assert!(matches!(
        ListError::from(DomainError::Dispatch(DispatchError::Stopped)),
        ListError::Internal { .. }
    ));
    assert!(matches!(
        ListError::from(DomainError::Timeout { duration_ms: 5 }),
        ListError::Timeout { duration_ms: 5 }
    ));
    assert!(matches!(
        ListError::from(DomainError::InvalidCursor {
            object_type: "clients".into(),
            message: "bad".into()
        }),
        ListError::InvalidCursor { .. }
    ));
    // Internal details stay out of the public message.
    let err = ListError::from(DomainError::Internal {
        message: "secret detail".into(),
    });
    assert_eq!(err.to_string(), "internal error");
}
