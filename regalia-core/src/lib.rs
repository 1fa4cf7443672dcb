// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types and resolution logic for per-user display identities.
//!
//! A display identity is a [`Bundle`] of chat and scoreboard attributes (tag
//! shown on the scoreboard, chat prefix, name and message colors) plus two
//! user preferences (chat sound, visibility). Bundles are derived from an
//! ordered [`RuleSet`] by [`resolve`], which consults an abstract
//! [`PermissionOracle`] for permission-based rules.
//!
//! Everything in this crate is pure and synchronous; caching and runtime
//! concerns live in `regalia-store` and `regalia-engine`.
pub mod bundle;
pub mod identity;
pub mod resolver;
pub mod ruleset;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use bundle::{Attributes, Bundle, Placement, compose};
pub use identity::{UserId, UserIdError};
pub use resolver::{PermissionOracle, resolve};
pub use ruleset::{Rule, RuleSet};
