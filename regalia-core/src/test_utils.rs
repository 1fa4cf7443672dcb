// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for tests across the workspace.
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::identity::UserId;
use crate::resolver::PermissionOracle;

/// A permission oracle over an explicit grant table.
///
/// Grants can be added and revoked while the oracle is shared, mimicking a
/// backend whose answers change out-of-band while users are connected.
#[derive(Clone, Debug, Default)]
pub struct StaticOracle {
    grants: Arc<RwLock<HashSet<(UserId, String)>>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, id: UserId, token: &str) {
        self.grants
            .write()
            .expect("grants lock poisoned")
            .insert((id, token.to_string()));
    }

    pub fn revoke(&self, id: UserId, token: &str) {
        self.grants
            .write()
            .expect("grants lock poisoned")
            .remove(&(id, token.to_string()));
    }
}

impl PermissionOracle for StaticOracle {
    fn has_permission(&self, id: UserId, token: &str) -> bool {
        self.grants
            .read()
            .expect("grants lock poisoned")
            .contains(&(id, token.to_string()))
    }
}
