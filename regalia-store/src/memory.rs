// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory persistence for resolved display identities.
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regalia_core::{Bundle, UserId};

use crate::traits::{StoreError, TagStore};

#[derive(Debug, Default)]
pub struct InnerMemoryStore {
    tags: HashMap<UserId, Bundle>,
}

/// An in-memory [`TagStore`].
///
/// `MemoryStore` supports usage in asynchronous and multi-threaded contexts
/// by wrapping an `InnerMemoryStore` with an `RwLock` and `Arc`. Convenience
/// methods are provided to obtain a read- or write-lock on the underlying
/// store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a read-lock on the store.
    pub fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner.read().expect("memory store lock poisoned")
    }

    /// Obtain a write-lock on the store.
    pub fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner.write().expect("memory store lock poisoned")
    }
}

impl TagStore for MemoryStore {
    fn get(&self, id: UserId) -> Result<Option<Bundle>, StoreError> {
        Ok(self.read_store().tags.get(&id).cloned())
    }

    fn insert(&mut self, id: UserId, bundle: Bundle) -> Result<(), StoreError> {
        self.write_store().tags.insert(id, bundle);
        Ok(())
    }

    fn remove(&mut self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.write_store().tags.remove(&id).is_some())
    }

    fn user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self.read_store().tags.keys().copied().collect())
    }
}
