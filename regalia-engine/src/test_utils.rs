// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for engine tests.
use std::sync::{Arc, Mutex, MutexGuard};

use regalia_core::UserId;

use crate::presentation::{PresentationError, PresentationSink};

#[derive(Debug, Default)]
struct RecordingSinkState {
    attempts: usize,
    calls: Vec<(UserId, String)>,
    fail_remaining: u32,
}

/// A presentation sink recording every badge update.
///
/// Clones share state, so a clone can be handed to the engine while the
/// test keeps inspecting calls. A bounded number of injected failures can
/// simulate presentation state that is not ready yet.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<RecordingSinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail.
    pub fn fail_next(&self, count: u32) {
        self.state().fail_remaining = count;
    }

    /// Successful badge updates, in call order.
    pub fn calls(&self) -> Vec<(UserId, String)> {
        self.state().calls.clone()
    }

    /// Number of successful badge updates.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Number of attempts, including failed ones.
    pub fn attempt_count(&self) -> usize {
        self.state().attempts
    }

    /// The badge currently applied for an identity.
    pub fn badge(&self, id: UserId) -> Option<String> {
        self.state()
            .calls
            .iter()
            .rev()
            .find(|(call_id, _)| *call_id == id)
            .map(|(_, text)| text.clone())
    }

    fn state(&self) -> MutexGuard<'_, RecordingSinkState> {
        self.state.lock().expect("recording sink lock poisoned")
    }
}

impl PresentationSink for RecordingSink {
    fn set_badge(&mut self, id: UserId, text: &str) -> Result<(), PresentationError> {
        let mut state = self.state();
        state.attempts += 1;
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(PresentationError::Rejected(
                "injected test failure".to_string(),
            ));
        }
        state.calls.push((id, text.to_string()));
        Ok(())
    }
}

/// Install a log subscriber honoring `RUST_LOG` for a test run.
#[cfg(feature = "test_utils")]
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
