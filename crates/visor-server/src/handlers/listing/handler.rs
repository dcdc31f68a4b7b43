//! Listing handler implementation.

use std::sync::Arc;

use tracing::{debug, error, instrument};
use visor_domain::resolver::{ObjectLister, PermissionResolver, ResolveRequest, TypeScope};

use super::types::{ListError, ListResourcesRequest, ListResourcesResponse, ListResult};
use crate::auth::Principal;

/// Handler for permission-filtered listing.
pub struct ListResourcesHandler<L> {
    resolver: Arc<PermissionResolver<L>>,
}

impl<L: ObjectLister> ListResourcesHandler<L> {
    pub fn new(resolver: Arc<PermissionResolver<L>>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<PermissionResolver<L>> {
        &self.resolver
    }

    /// Lists one page of objects the principal may view.
    #[instrument(skip_all, fields(object_type = request.object_type.as_deref()))]
    pub async fn list(
        &self,
        principal: Option<&Principal>,
        request: ListResourcesRequest,
    ) -> ListResult<ListResourcesResponse> {
        let Some(principal) = principal else {
            return Err(ListError::Unauthorized);
        };

        let scope = match request.object_type.as_deref().map(str::trim) {
            None | Some("") => TypeScope::All,
            Some(object_type) => TypeScope::Single(object_type.to_string()),
        };
        let resolve = ResolveRequest::new(principal.subject.clone(), scope)
            .with_continuation_token(request.continuation_token.unwrap_or_default());

        let page = self.resolver.resolve(resolve).await.map_err(|e| {
            let err = ListError::from(e);
            if let ListError::Internal { message } = &err {
                error!(error = %message, "Listing failed");
            }
            err
        })?;

        debug!(subject = %principal.subject, count = page.count(), "Listed resources");
        Ok(ListResourcesResponse {
            count: page.count(),
            continuation_token: page.continuation_token(),
            items: page.items,
        })
    }
}
