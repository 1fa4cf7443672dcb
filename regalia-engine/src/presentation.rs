// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam towards the host's presentation state (the scoreboard).
use regalia_core::UserId;
use thiserror::Error;

/// Receiver of resolved scoreboard badges.
///
/// Implementations should be idempotent. The engine additionally tracks the
/// last value it pushed per identity and skips calls that would not change
/// anything, so one actual change triggers exactly one refresh.
///
/// Failures are treated as transient: during apply-on-join the engine
/// retries on a fixed delay up to a bounded attempt budget.
pub trait PresentationSink {
    fn set_badge(&mut self, id: UserId, text: &str) -> Result<(), PresentationError>;
}

#[derive(Error, Debug)]
pub enum PresentationError {
    #[error("presentation state rejected the update: {0}")]
    Rejected(String),
}

/// A sink that discards every update.
///
/// Useful for headless operation and tests that only exercise resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn set_badge(&mut self, _id: UserId, _text: &str) -> Result<(), PresentationError> {
        Ok(())
    }
}
