//! Business logic services

pub mod catalog;
pub mod identity;
pub mod lending;
pub mod members;

use std::sync::Arc;

use crate::{config::LendingConfig, store::InventoryStore};

/// Container for all services, wired over one shared injected store
/// handle.
#[derive(Clone)]
pub struct Services<S: InventoryStore + Clone> {
    pub catalog: catalog::CatalogService<S>,
    pub identity: identity::IdentityService<S>,
    pub lending: lending::LendingService<S>,
    pub members: members::MembersService<S>,
}

impl<S: InventoryStore + Clone> Services<S> {
    /// Create all services with the given store handle
    pub fn new(store: Arc<S>, lending_config: LendingConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(Arc::clone(&store)),
            identity: identity::IdentityService::new(Arc::clone(&store)),
            lending: lending::LendingService::new(Arc::clone(&store), lending_config),
            members: members::MembersService::new(store),
        }
    }
}
