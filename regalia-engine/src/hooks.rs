// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observer registration and dispatch for the message pipeline and for
//! attribute-change notifications.
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use regalia_core::{Bundle, UserId};
use tracing::error;

use crate::message::MessageContext;

/// Result of one vetoing observer, and the aggregate of a whole stage.
///
/// Stages fold observer results left to right: `Stop` short-circuits the
/// stage immediately, otherwise the aggregate is `Handled` if at least one
/// observer said so, else `Continue`. Outcomes `>= Stop` are terminal for
/// the whole dispatch and suppress the message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum HookOutcome {
    #[default]
    Continue,
    Handled,
    Stop,
}

type MessageObserver = dyn Fn(&mut MessageContext) -> HookOutcome + Send + Sync;
type MessageNotifier = dyn Fn(&MessageContext) + Send + Sync;
type ChangeNotifier = dyn Fn(UserId, &Bundle) + Send + Sync;

/// One dispatch stage: an ordered observer list plus a reentrancy guard.
struct Stage<T: ?Sized> {
    observers: RwLock<Vec<Arc<T>>>,
    in_flight: AtomicBool,
}

impl<T: ?Sized> Default for Stage<T> {
    fn default() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }
}

impl<T: ?Sized> Stage<T> {
    fn push(&self, observer: Arc<T>) {
        self.observers
            .write()
            .expect("observer list lock poisoned")
            .push(observer);
    }

    /// Snapshot the observer list so registration during dispatch can not
    /// invalidate the iteration.
    fn snapshot(&self) -> Vec<Arc<T>> {
        self.observers
            .read()
            .expect("observer list lock poisoned")
            .clone()
    }
}

/// Scoped reentrancy guard: set on entry, cleared on every exit path
/// (including unwinding), so a fault in an observer can not leave the stage
/// permanently locked.
struct StageGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> StageGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::Acquire) {
            return None;
        }
        Some(Self { flag })
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Registration and dispatch point for all engine hooks.
///
/// Three stages per outgoing message (`pre`, `process`, `post`) and one
/// notification pair per attribute change (`changed_pre`, `changed_post`).
/// Each stage carries its own reentrancy guard: an observer that triggers a
/// nested synchronous dispatch of the stage it is currently running in gets
/// a no-op `Continue` for the nested call instead of running twice.
///
/// Observer failures (panics) in `pre`/`process` abort the dispatch and
/// propagate — partially formatted messages are worse than dropped ones.
/// Failures in the notification stages are isolated per observer and logged;
/// siblings still run.
#[derive(Default)]
pub struct Hooks {
    message_pre: Stage<MessageObserver>,
    message_process: Stage<MessageObserver>,
    message_post: Stage<MessageNotifier>,
    changed_pre: Stage<ChangeNotifier>,
    changed_post: Stage<ChangeNotifier>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

impl Hooks {
    /// Register a vetoing observer for the `pre` message stage.
    pub fn on_message_pre<F>(&self, observer: F)
    where
        F: Fn(&mut MessageContext) -> HookOutcome + Send + Sync + 'static,
    {
        self.message_pre.push(Arc::new(observer));
    }

    /// Register a vetoing observer for the `process` message stage.
    pub fn on_message_process<F>(&self, observer: F)
    where
        F: Fn(&mut MessageContext) -> HookOutcome + Send + Sync + 'static,
    {
        self.message_process.push(Arc::new(observer));
    }

    /// Register a fire-and-forget observer for delivered messages.
    pub fn on_message_post<F>(&self, observer: F)
    where
        F: Fn(&MessageContext) + Send + Sync + 'static,
    {
        self.message_post.push(Arc::new(observer));
    }

    /// Register a notification observer running before attribute mutations.
    pub fn on_changed_pre<F>(&self, observer: F)
    where
        F: Fn(UserId, &Bundle) + Send + Sync + 'static,
    {
        self.changed_pre.push(Arc::new(observer));
    }

    /// Register a notification observer running after attribute mutations.
    pub fn on_changed_post<F>(&self, observer: F)
    where
        F: Fn(UserId, &Bundle) + Send + Sync + 'static,
    {
        self.changed_post.push(Arc::new(observer));
    }

    /// Dispatch the `pre` message stage.
    pub fn message_pre(&self, ctx: &mut MessageContext) -> HookOutcome {
        Self::dispatch_veto(&self.message_pre, ctx)
    }

    /// Dispatch the `process` message stage.
    pub fn message_process(&self, ctx: &mut MessageContext) -> HookOutcome {
        Self::dispatch_veto(&self.message_process, ctx)
    }

    /// Notify `post` observers of a delivered message.
    pub fn message_post(&self, ctx: &MessageContext) {
        let Some(_guard) = StageGuard::enter(&self.message_post.in_flight) else {
            return;
        };

        for observer in self.message_post.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer(ctx))) {
                error!(?payload, "message post observer panicked");
            }
        }
    }

    /// Notify observers that an attribute mutation is about to happen.
    pub fn changed_pre(&self, id: UserId, bundle: &Bundle) {
        Self::notify_change(&self.changed_pre, id, bundle, "pre");
    }

    /// Notify observers that an attribute mutation happened.
    pub fn changed_post(&self, id: UserId, bundle: &Bundle) {
        Self::notify_change(&self.changed_post, id, bundle, "post");
    }

    fn dispatch_veto(stage: &Stage<MessageObserver>, ctx: &mut MessageContext) -> HookOutcome {
        let Some(_guard) = StageGuard::enter(&stage.in_flight) else {
            return HookOutcome::Continue;
        };

        let mut aggregate = HookOutcome::Continue;
        for observer in stage.snapshot() {
            match observer(ctx) {
                HookOutcome::Stop => return HookOutcome::Stop,
                HookOutcome::Handled => aggregate = HookOutcome::Handled,
                HookOutcome::Continue => {}
            }
        }
        aggregate
    }

    fn notify_change(stage: &Stage<ChangeNotifier>, id: UserId, bundle: &Bundle, which: &str) {
        let Some(_guard) = StageGuard::enter(&stage.in_flight) else {
            return;
        };

        for observer in stage.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer(id, bundle))) {
                error!(?payload, which, "attribute change observer panicked");
            }
        }
    }
}
