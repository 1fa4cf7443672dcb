// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime service tying display-identity resolution to a live host.
//!
//! The [`Engine`] is a single-writer actor: every cache read and write, every
//! pipeline stage and every presentation push happens on one task, driven by
//! an inbox of identity events (connect, disconnect, spawn, team change,
//! chat) and two internal timers (the periodic permission revalidation loop
//! and the apply-on-join retry queue). Handles are cheap to clone and safe to
//! use from any task; they only ever enqueue work.
//!
//! Outgoing chat messages run through a three-stage hook pipeline
//! ([`Hooks`]): `pre` and `process` observers can veto or rewrite a message,
//! `post` observers are notified after the fact. Attribute mutations are
//! bracketed by a `changed_pre`/`changed_post` notification pair.
mod actor;
pub mod config;
mod engine;
pub mod format;
pub mod hooks;
pub mod message;
pub mod presentation;
mod team;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use config::{ChatConfig, Config};
pub use engine::{Engine, EngineBuilder, EngineError};
pub use hooks::{HookOutcome, Hooks};
pub use message::{ChatDelivery, ChatRequest, ChatVerdict, MessageContext};
pub use presentation::{NullSink, PresentationError, PresentationSink};
pub use team::Team;
