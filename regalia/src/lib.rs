// SPDX-License-Identifier: MIT OR Apache-2.0

//! Permission-driven display identities for game servers.
//!
//! `regalia` resolves a per-user display identity (scoreboard badge, chat
//! prefix, name and message colors, sound and visibility preferences) from a
//! prioritized rule set, keeps it cached and revalidated against a live
//! permission backend, and runs every outgoing chat message through an
//! extensible hook pipeline.
//!
//! This crate re-exports the workspace members:
//!
//! - [`regalia_core`] — data types and the pure resolver.
//! - [`regalia_store`] — the storage seam and the caching policy.
//! - [`regalia_engine`] — the runtime service: events, revalidation loop,
//!   attribute mutators and the message pipeline.
//!
//! ## Example
//!
//! ```no_run
//! use regalia::{Bundle, EngineBuilder, Rule, RuleSet, UserId};
//! # use regalia::PermissionOracle;
//! # #[derive(Clone)]
//! # struct Backend;
//! # impl PermissionOracle for Backend {
//! #     fn has_permission(&self, _id: UserId, _token: &str) -> bool {
//! #         false
//! #     }
//! # }
//!
//! # async fn run() {
//! let rules = RuleSet::new(
//!     Bundle::default(),
//!     vec![Rule {
//!         token: "vip".to_string(),
//!         bundle: Bundle {
//!             score_tag: "[VIP]".to_string(),
//!             ..Default::default()
//!         },
//!     }],
//! );
//!
//! let engine = EngineBuilder::new(Backend).rules(rules).spawn();
//! engine.connected(UserId::new(76561197960265728)).await.unwrap();
//! # }
//! ```
pub use regalia_core::{
    Attributes, Bundle, PermissionOracle, Placement, Rule, RuleSet, UserId, compose, resolve,
};
pub use regalia_engine::{
    ChatConfig, ChatDelivery, ChatRequest, ChatVerdict, Config, Engine, EngineBuilder,
    EngineError, HookOutcome, Hooks, MessageContext, NullSink, PresentationError,
    PresentationSink, Team,
};
pub use regalia_store::{MemoryStore, Revalidation, StoreError, TagCache, TagStore};

#[cfg(feature = "test_utils")]
pub mod test_utils {
    pub use regalia_core::test_utils::StaticOracle;
    pub use regalia_engine::test_utils::RecordingSink;
}
