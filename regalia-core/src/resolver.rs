// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::bundle::Bundle;
use crate::identity::UserId;
use crate::ruleset::RuleSet;

/// Abstract permission/group backend.
///
/// Answers may change over time: permissions can be granted or revoked while
/// a user is connected, which is exactly why cached resolutions are
/// revalidated periodically. Implementations must be cheap to call
/// synchronously and repeatedly.
pub trait PermissionOracle {
    fn has_permission(&self, id: UserId, token: &str) -> bool;
}

impl<T: PermissionOracle + ?Sized> PermissionOracle for &T {
    fn has_permission(&self, id: UserId, token: &str) -> bool {
        (**self).has_permission(id, token)
    }
}

impl<T: PermissionOracle + ?Sized> PermissionOracle for Box<T> {
    fn has_permission(&self, id: UserId, token: &str) -> bool {
        (**self).has_permission(id, token)
    }
}

/// Resolve the display identity for `id` against a rule set.
///
/// Two-tier matching with deterministic precedence:
///
/// 1. A rule whose token equals the literal decimal form of `id` always wins,
///    regardless of its position. This tier exists for per-user overrides
///    independent of any permission system.
/// 2. Otherwise the first rule in declared order with a non-empty token the
///    oracle confirms wins. Blank tokens are never eligible, so a
///    half-filled rule can not become an accidental "everyone" match.
///
/// Total: an identity with no matching rule resolves to the default bundle,
/// never an error. The returned bundle is an independent clone; callers may
/// mutate it freely without affecting the rule set.
pub fn resolve(id: UserId, rules: &RuleSet, oracle: &impl PermissionOracle) -> Bundle {
    let literal = id.to_string();

    if let Some(rule) = rules.rules.iter().find(|rule| rule.token == literal) {
        return rule.bundle.clone();
    }

    rules
        .rules
        .iter()
        .find(|rule| !rule.token.trim().is_empty() && oracle.has_permission(id, &rule.token))
        .map(|rule| rule.bundle.clone())
        .unwrap_or_else(|| rules.default.clone())
}
