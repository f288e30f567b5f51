//! Identity resolution service
//!
//! Maps a session's claimed member name to a stable person id. The lookup
//! runs outside any transaction (read-only, stale reads acceptable); the
//! resolved id is passed to the lending engine as an opaque value.

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    store::InventoryStore,
};

#[derive(Clone)]
pub struct IdentityService<S: InventoryStore + Clone> {
    store: Arc<S>,
}

impl<S: InventoryStore + Clone> IdentityService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a claimed member name to the unique matching person id.
    /// Zero matches and ambiguous matches both fail with `NotFound`.
    pub async fn resolve(&self, name: &str) -> AppResult<String> {
        let name = name.trim();
        let matches = self.store.find_people_by_name(name).await?;
        match matches.as_slice() {
            [person] => Ok(person.id.clone()),
            [] => Err(AppError::NotFound(format!("no person named {name}"))),
            _ => {
                tracing::warn!(name, count = matches.len(), "ambiguous member name");
                Err(AppError::NotFound(format!("member name {name} is ambiguous")))
            }
        }
    }
}
