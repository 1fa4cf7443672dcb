// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;

/// One prioritized rule mapping a token to a display identity.
///
/// The token is either the literal decimal form of a user id (a per-user
/// override) or a permission/group name checked against the
/// [`crate::PermissionOracle`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub token: String,

    #[serde(flatten)]
    pub bundle: Bundle,
}

/// The complete, ordered rule configuration.
///
/// Declared order defines precedence among permission rules: the first
/// matching rule wins. The set is replaced wholesale on configuration
/// reload and is read-only while a resolution is in flight.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Used whenever no rule matches.
    #[serde(default)]
    pub default: Bundle,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(default: Bundle, rules: Vec<Rule>) -> Self {
        Self { default, rules }
    }
}
