// SPDX-License-Identifier: MIT OR Apache-2.0

use regalia_core::{Bundle, PermissionOracle, RuleSet, UserId, resolve};
use tracing::debug;

use crate::traits::{StoreError, TagStore};

/// Outcome of a periodic revalidation of one identity.
#[derive(Clone, Debug, PartialEq)]
pub enum Revalidation {
    /// The recomputed bundle matches the cached one; nothing to push.
    Unchanged,

    /// The display identity changed; the new bundle must be pushed to
    /// presentation state.
    Changed(Bundle),
}

/// Caching layer over a [`TagStore`].
///
/// The cache deliberately never stores a bundle whose content equals the
/// rule set default. Permission backends may attach grants asynchronously
/// after a user connects; a cached default would "lock in" the
/// not-yet-permissioned state and stop later recomputations from ever
/// discovering the grant. Returning but not storing the default keeps every
/// subsequent read eligible for re-resolution until a real match appears.
#[derive(Clone, Debug)]
pub struct TagCache<S> {
    store: S,
}

impl<S: TagStore> TagCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get the cached bundle for an identity, resolving it first if needed.
    ///
    /// With `force` set the fast path is skipped and the bundle is always
    /// recomputed from the rules. User preferences of an existing entry
    /// survive the recomputation.
    pub fn get_or_create(
        &mut self,
        id: UserId,
        force: bool,
        rules: &RuleSet,
        oracle: &impl PermissionOracle,
    ) -> Result<Bundle, StoreError> {
        let cached = self.store.get(id)?;

        if !force {
            if let Some(cached) = &cached {
                return Ok(cached.clone());
            }
        }

        let mut bundle = resolve(id, rules, oracle);
        if let Some(cached) = &cached {
            bundle.adopt_preferences(cached);
        }

        if bundle.content_eq(&rules.default) {
            if self.store.remove(id)? {
                debug!(%id, "evicted stale entry, identity resolves to default");
            }
        } else {
            self.store.insert(id, bundle.clone())?;
        }

        Ok(bundle)
    }

    /// Recompute the identity and reconcile the cache, reporting whether the
    /// display identity actually changed.
    ///
    /// Called periodically for every connected identity so permission grants
    /// and revocations take effect without a reconnect. A recomputation that
    /// matches the cached content is suppressed ([`Revalidation::Unchanged`])
    /// so no redundant presentation updates are generated.
    pub fn revalidate(
        &mut self,
        id: UserId,
        rules: &RuleSet,
        oracle: &impl PermissionOracle,
    ) -> Result<Revalidation, StoreError> {
        let cached = self.store.get(id)?;
        let mut computed = resolve(id, rules, oracle);

        match &cached {
            Some(cached) => {
                computed.adopt_preferences(cached);
                if cached.content_eq(&computed) {
                    return Ok(Revalidation::Unchanged);
                }
            }
            // No entry and still resolving to default: the identity never
            // left the default state, there is nothing to reconcile.
            None => {
                if computed.content_eq(&rules.default) {
                    return Ok(Revalidation::Unchanged);
                }
            }
        }

        if computed.content_eq(&rules.default) {
            self.store.remove(id)?;
            debug!(%id, "display identity reverted to default");
        } else {
            self.store.insert(id, computed.clone())?;
        }

        Ok(Revalidation::Changed(computed))
    }

    /// Write a bundle through to the store unconditionally.
    ///
    /// Used by the attribute mutators and preference setters. Deliberately
    /// exempt from the never-cache-default policy: a user-initiated write
    /// must stick even when the bundle content equals the default, otherwise
    /// a preference toggled by a default-resolved user would be lost.
    pub fn store(&mut self, id: UserId, bundle: Bundle) -> Result<(), StoreError> {
        self.store.insert(id, bundle)
    }

    /// Drop the cache entry for an identity, if any.
    pub fn evict(&mut self, id: UserId) -> Result<bool, StoreError> {
        self.store.remove(id)
    }

    /// Read the raw cache entry without resolving.
    pub fn cached(&self, id: UserId) -> Result<Option<Bundle>, StoreError> {
        self.store.get(id)
    }

    /// All identities currently holding a cache entry.
    pub fn user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        self.store.user_ids()
    }
}
