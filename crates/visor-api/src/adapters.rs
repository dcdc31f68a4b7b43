//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (visor-domain) defines [`ObjectLister`], the one call the
//! permission resolver needs. The storage layer (visor-storage) implements
//! [`PermissionStore`] with concrete backends. [`StoreObjectLister`] connects
//! the two and translates storage errors into domain errors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use visor_domain::error::{DomainError, DomainResult};
use visor_domain::resolver::{ObjectLister, ObjectPage, QueryFilter};
use visor_storage::{PermissionFilter, PermissionStore, StorageError};

/// Adapter that implements `ObjectLister` using a `PermissionStore`.
pub struct StoreObjectLister<S: PermissionStore> {
    storage: Arc<S>,
}

impl<S: PermissionStore> StoreObjectLister<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

#[async_trait]
impl<S: PermissionStore> ObjectLister for StoreObjectLister<S> {
    async fn list_objects(&self, subject: &str, filter: &QueryFilter) -> DomainResult<ObjectPage> {
        let mut filters = vec![
            PermissionFilter::Relation(filter.relation.clone()),
            PermissionFilter::Types(vec![filter.object_type.clone()]),
            PermissionFilter::PageSize(filter.page_size),
        ];
        if let Some(cursor) = &filter.starting_cursor {
            filters.push(PermissionFilter::TokenMap(HashMap::from([(
                filter.object_type.clone(),
                cursor.clone(),
            )])));
        }

        let mut page = self
            .storage
            .list_permissions_with_filters(subject, &filters)
            .await
            .map_err(|e| storage_to_domain(&filter.object_type, e))?;

        Ok(ObjectPage {
            next_cursor: page.continuation_tokens.remove(&filter.object_type),
            objects: page.objects,
        })
    }
}

fn storage_to_domain(object_type: &str, err: StorageError) -> DomainError {
    match err {
        StorageError::InvalidContinuationToken { message } => DomainError::InvalidCursor {
            object_type: object_type.to_string(),
            message,
        },
        other => DomainError::StoreQuery {
            object_types: vec![object_type.to_string()],
            message: other.to_string(),
        },
    }
}
