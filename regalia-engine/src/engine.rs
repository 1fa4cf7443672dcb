// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use regalia_core::{Attributes, PermissionOracle, Placement, RuleSet, UserId};
use regalia_store::{MemoryStore, StoreError, TagCache};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use crate::actor::{EngineActor, ToEngineActor};
use crate::config::Config;
use crate::hooks::Hooks;
use crate::message::{ChatRequest, ChatVerdict};
use crate::presentation::{NullSink, PresentationSink};
use crate::team::Team;

/// Inbox capacity of the engine actor.
const ENGINE_INBOX_SIZE: usize = 64;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine has been shut down")]
    Shutdown,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builder for the engine service.
///
/// The oracle answers permission questions, the presentation sink receives
/// scoreboard badges, and the rule set defines which permissions map to
/// which display identity. `spawn` must be called from within a tokio
/// runtime.
pub struct EngineBuilder<O> {
    config: Config,
    rules: RuleSet,
    oracle: O,
    sink: Box<dyn PresentationSink + Send>,
}

impl<O> EngineBuilder<O>
where
    O: PermissionOracle + Send + 'static,
{
    pub fn new(oracle: O) -> Self {
        Self {
            config: Config::default(),
            rules: RuleSet::default(),
            oracle,
            sink: Box::new(NullSink),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn presentation(mut self, sink: impl PresentationSink + Send + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Start the engine actor and return a handle to it.
    pub fn spawn(self) -> Engine {
        let (engine_actor_tx, inbox) = mpsc::channel(ENGINE_INBOX_SIZE);
        let hooks = Arc::new(Hooks::default());

        let actor = EngineActor::new(
            self.config,
            Arc::new(self.rules),
            self.oracle,
            self.sink,
            hooks.clone(),
            TagCache::new(MemoryStore::new()),
            inbox,
        );

        tokio::task::spawn(async move {
            if let Err(err) = actor.run().await {
                error!("engine actor failed: {err:?}");
            }
        });

        Engine {
            engine_actor_tx,
            hooks,
        }
    }
}

/// Handle to a running engine.
///
/// Cheap to clone; every method enqueues work for the single actor task, so
/// calls made through one handle are processed in order.
#[derive(Clone, Debug)]
pub struct Engine {
    engine_actor_tx: mpsc::Sender<ToEngineActor>,
    hooks: Arc<Hooks>,
}

impl Engine {
    /// Hook registration point for the message pipeline and the
    /// attribute-change notifications.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Report that an identity connected.
    pub async fn connected(&self, id: UserId) -> Result<(), EngineError> {
        self.send(ToEngineActor::Connected { id }).await
    }

    /// Report that an identity disconnected.
    pub async fn disconnected(&self, id: UserId) -> Result<(), EngineError> {
        self.send(ToEngineActor::Disconnected { id }).await
    }

    /// Report that an identity (re-)spawned into the world.
    pub async fn spawned(&self, id: UserId) -> Result<(), EngineError> {
        self.send(ToEngineActor::Spawned { id }).await
    }

    /// Report that an identity joined or switched team.
    pub async fn team_changed(&self, id: UserId, team: Team) -> Result<(), EngineError> {
        self.send(ToEngineActor::TeamChanged { id, team }).await
    }

    /// Run one outgoing chat message through the pipeline.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatVerdict, EngineError> {
        self.request(|reply| ToEngineActor::Chat { request, reply })
            .await
    }

    /// Compose a value onto the selected attributes of a cached bundle.
    pub async fn add_attribute(
        &self,
        id: UserId,
        kinds: Attributes,
        placement: Placement,
        value: impl Into<String>,
    ) -> Result<(), EngineError> {
        let value = value.into();
        self.request(|reply| ToEngineActor::AddAttribute {
            id,
            kinds,
            placement,
            value,
            reply,
        })
        .await
    }

    /// Overwrite the selected attributes of a cached bundle.
    pub async fn set_attribute(
        &self,
        id: UserId,
        kinds: Attributes,
        value: impl Into<String>,
    ) -> Result<(), EngineError> {
        let value = value.into();
        self.request(|reply| ToEngineActor::SetAttribute {
            id,
            kinds,
            value,
            reply,
        })
        .await
    }

    /// Read one attribute of a cached bundle.
    ///
    /// Returns `None` unless `kind` selects exactly one attribute, or when
    /// the identity is unknown.
    pub async fn attribute(
        &self,
        id: UserId,
        kind: Attributes,
    ) -> Result<Option<String>, EngineError> {
        self.request(|reply| ToEngineActor::GetAttribute { id, kind, reply })
            .await
    }

    /// Reset the selected attributes to their from-scratch resolved values.
    pub async fn reset_attribute(&self, id: UserId, kinds: Attributes) -> Result<(), EngineError> {
        self.request(|reply| ToEngineActor::ResetAttribute { id, kinds, reply })
            .await
    }

    /// The identity's chat sound preference.
    pub async fn chat_sound(&self, id: UserId) -> Result<bool, EngineError> {
        self.request(|reply| ToEngineActor::ChatSound { id, reply })
            .await
    }

    pub async fn set_chat_sound(&self, id: UserId, value: bool) -> Result<(), EngineError> {
        self.request(|reply| ToEngineActor::SetChatSound { id, value, reply })
            .await
    }

    /// The identity's visibility preference.
    pub async fn visibility(&self, id: UserId) -> Result<bool, EngineError> {
        self.request(|reply| ToEngineActor::Visibility { id, reply })
            .await
    }

    pub async fn set_visibility(&self, id: UserId, value: bool) -> Result<(), EngineError> {
        self.request(|reply| ToEngineActor::SetVisibility { id, value, reply })
            .await
    }

    /// Swap in a new rule set and re-apply every connected identity.
    pub async fn reload_rules(&self, rules: RuleSet) -> Result<(), EngineError> {
        self.request(|reply| ToEngineActor::ReloadRules { rules, reply })
            .await
    }

    /// Stop the engine. Pending deferred work (revalidation ticks, apply
    /// retries) is dropped with the actor and nothing is rescheduled.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        self.request(|reply| ToEngineActor::Shutdown { reply })
            .await
    }

    async fn send(&self, msg: ToEngineActor) -> Result<(), EngineError> {
        self.engine_actor_tx
            .send(msg)
            .await
            .map_err(|_| EngineError::Shutdown)
    }

    async fn request<T>(
        &self,
        msg: impl FnOnce(oneshot::Sender<T>) -> ToEngineActor,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(msg(reply)).await?;
        rx.await.map_err(|_| EngineError::Shutdown)
    }
}
