//! Application state for HTTP handlers.

use std::sync::Arc;

use visor_domain::dispatcher::Dispatcher;
use visor_domain::resolver::{PermissionResolver, ResolverConfig};
use visor_server::auth::Authenticator;
use visor_server::handlers::listing::ListResourcesHandler;
use visor_storage::PermissionStore;

use crate::adapters::StoreObjectLister;
use crate::validation::ValidatorRegistry;

/// Application state shared across all HTTP handlers.
///
/// The listing handler reaches the store through [`StoreObjectLister`]; the
/// tuple administration routes use `storage` directly.
pub struct AppState<S: PermissionStore> {
    /// The permission store backend.
    pub storage: Arc<S>,
    /// Worker pool shared by every listing request.
    pub dispatcher: Arc<Dispatcher>,
    /// Permission-filtered listing.
    pub listing: Arc<ListResourcesHandler<StoreObjectLister<S>>>,
    /// Resolves the caller of each request.
    pub authenticator: Arc<dyn Authenticator>,
    /// Payload validators applied before handlers run.
    pub validators: Arc<ValidatorRegistry>,
}

impl<S: PermissionStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            dispatcher: Arc::clone(&self.dispatcher),
            listing: Arc::clone(&self.listing),
            authenticator: Arc::clone(&self.authenticator),
            validators: Arc::clone(&self.validators),
        }
    }
}

impl<S: PermissionStore> AppState<S> {
    /// Wires the resolver and listing handler over `storage`, using the
    /// default payload validators.
    pub fn new(
        storage: Arc<S>,
        dispatcher: Arc<Dispatcher>,
        resolver_config: ResolverConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self::with_validators(
            storage,
            dispatcher,
            resolver_config,
            authenticator,
            ValidatorRegistry::with_defaults(),
        )
    }

    pub fn with_validators(
        storage: Arc<S>,
        dispatcher: Arc<Dispatcher>,
        resolver_config: ResolverConfig,
        authenticator: Arc<dyn Authenticator>,
        validators: ValidatorRegistry,
    ) -> Self {
        let lister = Arc::new(StoreObjectLister::new(Arc::clone(&storage)));
        let resolver = Arc::new(PermissionResolver::new(
            lister,
            Arc::clone(&dispatcher),
            resolver_config,
        ));

        Self {
            storage,
            dispatcher,
            listing: Arc::new(ListResourcesHandler::new(resolver)),
            authenticator,
            validators: Arc::new(validators),
        }
    }
}
