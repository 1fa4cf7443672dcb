// SPDX-License-Identifier: MIT OR Apache-2.0

use regalia_core::{Bundle, UserId};
use thiserror::Error;

/// Persistence seam for cached display identities.
///
/// Reads hand out independent clones, never shared references: a caller
/// mutating a returned bundle must not leak the change into the store or
/// into another caller's view. Writes go through [`TagStore::insert`].
pub trait TagStore {
    /// Get the cached bundle for an identity.
    fn get(&self, id: UserId) -> Result<Option<Bundle>, StoreError>;

    /// Insert or replace the cached bundle for an identity.
    fn insert(&mut self, id: UserId, bundle: Bundle) -> Result<(), StoreError>;

    /// Remove a cached bundle.
    ///
    /// Returns `true` when the removal occurred and `false` when no entry
    /// was present for the identity.
    fn remove(&mut self, id: UserId) -> Result<bool, StoreError>;

    /// All identities currently holding a cache entry.
    fn user_ids(&self) -> Result<Vec<UserId>, StoreError>;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("tag store backend failure: {0}")]
    Backend(String),
}
