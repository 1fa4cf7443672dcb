// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use regalia_core::{
    Attributes, Bundle, PermissionOracle, Placement, RuleSet, UserId, compose, resolve,
};
use regalia_store::{MemoryStore, Revalidation, TagCache};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, interval};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::engine::EngineError;
use crate::format;
use crate::hooks::{HookOutcome, Hooks};
use crate::message::{ChatDelivery, ChatRequest, ChatVerdict, MessageContext};
use crate::presentation::{PresentationError, PresentationSink};
use crate::team::Team;

pub enum ToEngineActor {
    Connected {
        id: UserId,
    },
    Disconnected {
        id: UserId,
    },
    Spawned {
        id: UserId,
    },
    TeamChanged {
        id: UserId,
        team: Team,
    },
    Chat {
        request: ChatRequest,
        reply: oneshot::Sender<ChatVerdict>,
    },
    AddAttribute {
        id: UserId,
        kinds: Attributes,
        placement: Placement,
        value: String,
        reply: oneshot::Sender<()>,
    },
    SetAttribute {
        id: UserId,
        kinds: Attributes,
        value: String,
        reply: oneshot::Sender<()>,
    },
    GetAttribute {
        id: UserId,
        kind: Attributes,
        reply: oneshot::Sender<Option<String>>,
    },
    ResetAttribute {
        id: UserId,
        kinds: Attributes,
        reply: oneshot::Sender<()>,
    },
    ChatSound {
        id: UserId,
        reply: oneshot::Sender<bool>,
    },
    SetChatSound {
        id: UserId,
        value: bool,
        reply: oneshot::Sender<()>,
    },
    Visibility {
        id: UserId,
        reply: oneshot::Sender<bool>,
    },
    SetVisibility {
        id: UserId,
        value: bool,
        reply: oneshot::Sender<()>,
    },
    ReloadRules {
        rules: RuleSet,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A badge application waiting for its next retry.
struct PendingApply {
    attempt: u32,
    due: Instant,
}

/// The two vetoing pipeline stages.
enum VetoStage {
    Pre,
    Process,
}

/// The single-writer task owning all mutable engine state.
///
/// Every cache access, pipeline dispatch and presentation push happens here,
/// serialized through the inbox; handles never touch state directly.
pub struct EngineActor<O> {
    config: Config,
    rules: Arc<RuleSet>,
    oracle: O,
    sink: Box<dyn PresentationSink + Send>,
    hooks: Arc<Hooks>,
    cache: TagCache<MemoryStore>,
    inbox: mpsc::Receiver<ToEngineActor>,

    /// Join instants of connected identities; doubles as the set of known
    /// identities and drives the permission warm-up window.
    joined: HashMap<UserId, Instant>,
    teams: HashMap<UserId, Team>,
    pending: HashMap<UserId, PendingApply>,

    /// Last badge pushed per identity, to skip redundant refreshes.
    applied: HashMap<UserId, String>,
}

impl<O> EngineActor<O>
where
    O: PermissionOracle + Send + 'static,
{
    pub fn new(
        config: Config,
        rules: Arc<RuleSet>,
        oracle: O,
        sink: Box<dyn PresentationSink + Send>,
        hooks: Arc<Hooks>,
        cache: TagCache<MemoryStore>,
        inbox: mpsc::Receiver<ToEngineActor>,
    ) -> Self {
        Self {
            config,
            rules,
            oracle,
            sink,
            hooks,
            cache,
            inbox,
            joined: HashMap::new(),
            teams: HashMap::new(),
            pending: HashMap::new(),
            applied: HashMap::new(),
        }
    }

    pub async fn run(mut self) -> Result<(), EngineError> {
        let mut revalidate = interval(self.config.revalidate_interval);
        let mut retry = interval(self.config.apply_retry_delay);

        loop {
            tokio::select! {
                biased;
                msg = self.inbox.recv() => {
                    match msg {
                        Some(ToEngineActor::Shutdown { reply }) => {
                            debug!("engine actor shutting down");
                            reply.send(()).ok();
                            break;
                        }
                        Some(msg) => self.on_actor_message(msg)?,
                        // All handles dropped, nothing can reach us anymore.
                        None => break,
                    }
                }
                // Periodically re-resolve every connected identity so
                // out-of-band permission changes surface without reconnect.
                _ = revalidate.tick() => {
                    self.revalidate_all()?;
                }
                _ = retry.tick(), if !self.pending.is_empty() => {
                    self.process_pending()?;
                }
            }
        }

        Ok(())
    }

    fn on_actor_message(&mut self, msg: ToEngineActor) -> Result<(), EngineError> {
        match msg {
            ToEngineActor::Connected { id } => {
                self.on_connected(id)?;
            }
            ToEngineActor::Disconnected { id } => {
                self.on_disconnected(id)?;
            }
            ToEngineActor::Spawned { id } => {
                if self.is_active(id) {
                    self.try_apply(id, 1, false)?;
                }
            }
            ToEngineActor::TeamChanged { id, team } => {
                if self.is_active(id) {
                    self.teams.insert(id, team);
                    self.try_apply(id, 1, true)?;
                }
            }
            ToEngineActor::Chat { request, reply } => {
                let verdict = self.on_chat(request)?;
                reply.send(verdict).ok();
            }
            ToEngineActor::AddAttribute {
                id,
                kinds,
                placement,
                value,
                reply,
            } => {
                self.add_attribute(id, kinds, placement, &value)?;
                reply.send(()).ok();
            }
            ToEngineActor::SetAttribute {
                id,
                kinds,
                value,
                reply,
            } => {
                self.set_attribute(id, kinds, &value)?;
                reply.send(()).ok();
            }
            ToEngineActor::GetAttribute { id, kind, reply } => {
                reply.send(self.get_attribute(id, kind)?).ok();
            }
            ToEngineActor::ResetAttribute { id, kinds, reply } => {
                self.reset_attribute(id, kinds)?;
                reply.send(()).ok();
            }
            ToEngineActor::ChatSound { id, reply } => {
                reply.send(self.preferences(id)?.chat_sound).ok();
            }
            ToEngineActor::SetChatSound { id, value, reply } => {
                self.mutate_preference(id, |bundle| bundle.chat_sound = value)?;
                reply.send(()).ok();
            }
            ToEngineActor::Visibility { id, reply } => {
                reply.send(self.preferences(id)?.visible).ok();
            }
            ToEngineActor::SetVisibility { id, value, reply } => {
                self.set_visibility(id, value)?;
                reply.send(()).ok();
            }
            ToEngineActor::ReloadRules { rules, reply } => {
                self.reload_rules(rules)?;
                reply.send(()).ok();
            }
            ToEngineActor::Shutdown { .. } => {
                unreachable!("handled in run");
            }
        }

        Ok(())
    }

    fn on_connected(&mut self, id: UserId) -> Result<(), EngineError> {
        if !id.is_valid() {
            return Ok(());
        }

        self.joined.insert(id, Instant::now());

        // Drop any stale entry so a default resolved now can not lock in;
        // the permission backend may still be loading this user's grants.
        self.cache.evict(id)?;
        self.pending.remove(&id);

        self.try_apply(id, 1, true)
    }

    fn on_disconnected(&mut self, id: UserId) -> Result<(), EngineError> {
        self.joined.remove(&id);
        self.teams.remove(&id);
        self.pending.remove(&id);
        self.applied.remove(&id);
        self.cache.evict(id)?;
        Ok(())
    }

    /// Resolve and push the badge for one identity, queueing a retry on a
    /// transient presentation failure.
    fn try_apply(&mut self, id: UserId, attempt: u32, force: bool) -> Result<(), EngineError> {
        if !self.is_active(id) {
            self.pending.remove(&id);
            return Ok(());
        }

        let force = force || self.within_warmup(id);
        let rules = self.rules.clone();
        let bundle = self.cache.get_or_create(id, force, &rules, &self.oracle)?;

        let badge = if bundle.visible {
            bundle.score_tag
        } else {
            rules.default.score_tag.clone()
        };

        if let Err(err) = self.push_badge(id, &badge) {
            if attempt >= self.config.apply_max_attempts {
                debug!(%id, attempt, "apply retry budget exhausted: {err}");
                self.pending.remove(&id);
            } else {
                warn!(%id, attempt, "badge application failed, retrying: {err}");
                self.pending.insert(
                    id,
                    PendingApply {
                        attempt: attempt + 1,
                        due: Instant::now() + self.config.apply_retry_delay,
                    },
                );
            }
        } else {
            self.pending.remove(&id);
        }

        Ok(())
    }

    fn process_pending(&mut self) -> Result<(), EngineError> {
        let now = Instant::now();
        let due: Vec<(UserId, u32)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(id, pending)| (*id, pending.attempt))
            .collect();

        for (id, attempt) in due {
            self.pending.remove(&id);
            // Retries always force: the whole point is to catch grants that
            // were still loading on the previous attempt.
            self.try_apply(id, attempt, true)?;
        }

        Ok(())
    }

    fn revalidate_all(&mut self) -> Result<(), EngineError> {
        let ids: Vec<UserId> = self.joined.keys().copied().collect();
        let rules = self.rules.clone();

        for id in ids {
            match self.cache.revalidate(id, &rules, &self.oracle)? {
                Revalidation::Unchanged => {}
                Revalidation::Changed(bundle) => {
                    let badge = if bundle.visible {
                        bundle.score_tag
                    } else {
                        rules.default.score_tag.clone()
                    };
                    if let Err(err) = self.push_badge(id, &badge) {
                        // The next tick re-resolves and retries naturally.
                        warn!(%id, "badge push failed during revalidation: {err}");
                    }
                }
            }
        }

        Ok(())
    }

    fn reload_rules(&mut self, rules: RuleSet) -> Result<(), EngineError> {
        self.rules = Arc::new(rules);
        debug!(rules = self.rules.rules.len(), "rule set replaced");

        let ids: Vec<UserId> = self.joined.keys().copied().collect();
        for id in ids {
            self.try_apply(id, 1, true)?;
        }

        Ok(())
    }

    fn on_chat(&mut self, request: ChatRequest) -> Result<ChatVerdict, EngineError> {
        let id = request.id;
        if !self.is_active(id) {
            return Ok(ChatVerdict::Untouched);
        }

        let force = self.within_warmup(id);
        let rules = self.rules.clone();
        let resolved = self.cache.get_or_create(id, force, &rules, &self.oracle)?;

        // Hidden users chat with the default display identity, but their
        // own preferences still apply.
        let bundle = if resolved.visible {
            resolved
        } else {
            let mut bundle = rules.default.clone();
            bundle.adopt_preferences(&resolved);
            bundle
        };

        let text = format::sanitize(&request.text);
        if text.is_empty() {
            return Ok(ChatVerdict::Suppressed);
        }

        let team = self.teams.get(&id).copied().unwrap_or_default();
        let chat_sound = bundle.chat_sound;
        let mut ctx = MessageContext {
            id,
            bundle,
            name: request.name,
            text,
            team,
            team_message: request.team_only,
            chat_sound,
        };

        match self.dispatch_veto_stage(&mut ctx, VetoStage::Pre) {
            Some(outcome) if outcome >= HookOutcome::Stop => {
                return Ok(ChatVerdict::Suppressed);
            }
            Some(_) => {}
            // A faulting observer aborts the dispatch: delivering a
            // partially formatted message is worse than dropping it.
            None => return Ok(ChatVerdict::Suppressed),
        }

        let prefix = if request.alive || team == Team::Spectators {
            self.config.chat.team_prefix(team)
        } else {
            self.config.chat.dead_prefix.as_str()
        };
        let team_name = if ctx.team_message {
            self.config.chat.team_name(team)
        } else {
            ""
        };

        ctx.name = format::format_display_name(
            team,
            prefix,
            team_name,
            &ctx.bundle.chat_tag,
            &ctx.bundle.name_color,
            &ctx.name,
        );
        ctx.text = format::format_body(team, &ctx.bundle.message_color, &ctx.text);

        match self.dispatch_veto_stage(&mut ctx, VetoStage::Process) {
            Some(outcome) if outcome >= HookOutcome::Stop => {
                return Ok(ChatVerdict::Suppressed);
            }
            Some(_) => {}
            None => return Ok(ChatVerdict::Suppressed),
        }

        let delivery = ChatDelivery {
            name: ctx.name.clone(),
            text: ctx.text.clone(),
            chat_sound: ctx.chat_sound,
        };

        self.hooks.message_post(&ctx);

        Ok(ChatVerdict::Deliver(delivery))
    }

    /// Run one vetoing stage, converting an observer panic into `None`.
    ///
    /// The stage's reentrancy guard resets on unwind, so a faulting observer
    /// costs one message, not the stage.
    fn dispatch_veto_stage(
        &self,
        ctx: &mut MessageContext,
        stage: VetoStage,
    ) -> Option<HookOutcome> {
        let result = catch_unwind(AssertUnwindSafe(|| match stage {
            VetoStage::Pre => self.hooks.message_pre(ctx),
            VetoStage::Process => self.hooks.message_process(ctx),
        }));

        match result {
            Ok(outcome) => Some(outcome),
            Err(payload) => {
                error!(?payload, "message observer panicked, message dropped");
                None
            }
        }
    }

    fn add_attribute(
        &mut self,
        id: UserId,
        kinds: Attributes,
        placement: Placement,
        value: &str,
    ) -> Result<(), EngineError> {
        self.mutate(id, |bundle| {
            for kind in [
                Attributes::SCORE_TAG,
                Attributes::CHAT_TAG,
                Attributes::NAME_COLOR,
                Attributes::MESSAGE_COLOR,
            ] {
                if kinds.contains(kind) {
                    let old = bundle.attribute(kind).unwrap_or_default().to_string();
                    bundle.set_attributes(kind, &compose(placement, &old, value));
                }
            }
            kinds.contains(Attributes::SCORE_TAG)
        })
    }

    fn set_attribute(&mut self, id: UserId, kinds: Attributes, value: &str) -> Result<(), EngineError> {
        self.mutate(id, |bundle| {
            bundle.set_attributes(kinds, value);
            kinds.contains(Attributes::SCORE_TAG)
        })
    }

    fn get_attribute(&mut self, id: UserId, kind: Attributes) -> Result<Option<String>, EngineError> {
        if !self.is_active(id) {
            return Ok(None);
        }

        let rules = self.rules.clone();
        let bundle = self.cache.get_or_create(id, false, &rules, &self.oracle)?;
        Ok(bundle.attribute(kind).map(str::to_string))
    }

    fn reset_attribute(&mut self, id: UserId, kinds: Attributes) -> Result<(), EngineError> {
        if !self.is_active(id) {
            return Ok(());
        }

        // From-scratch resolution, deliberately ignoring the cache.
        let rules = self.rules.clone();
        let fresh = resolve(id, &rules, &self.oracle);

        self.mutate(id, |bundle| {
            for kind in [
                Attributes::SCORE_TAG,
                Attributes::CHAT_TAG,
                Attributes::NAME_COLOR,
                Attributes::MESSAGE_COLOR,
            ] {
                if kinds.contains(kind) {
                    let value = fresh.attribute(kind).unwrap_or_default().to_string();
                    bundle.set_attributes(kind, &value);
                }
            }
            kinds.contains(Attributes::SCORE_TAG)
        })
    }

    fn set_visibility(&mut self, id: UserId, value: bool) -> Result<(), EngineError> {
        if !self.is_active(id) {
            return Ok(());
        }

        let rules = self.rules.clone();
        let mut bundle = self.cache.get_or_create(id, false, &rules, &self.oracle)?;

        self.hooks.changed_pre(id, &bundle);
        bundle.visible = value;
        self.cache.store(id, bundle.clone())?;

        let badge = if value {
            bundle.score_tag.clone()
        } else {
            rules.default.score_tag.clone()
        };
        if let Err(err) = self.push_badge(id, &badge) {
            warn!(%id, "badge push failed after visibility change: {err}");
        }

        self.hooks.changed_post(id, &bundle);
        Ok(())
    }

    fn mutate_preference(
        &mut self,
        id: UserId,
        apply: impl FnOnce(&mut Bundle),
    ) -> Result<(), EngineError> {
        if !self.is_active(id) {
            return Ok(());
        }

        let rules = self.rules.clone();
        let mut bundle = self.cache.get_or_create(id, false, &rules, &self.oracle)?;

        self.hooks.changed_pre(id, &bundle);
        apply(&mut bundle);
        self.cache.store(id, bundle.clone())?;
        self.hooks.changed_post(id, &bundle);
        Ok(())
    }

    /// Read-modify-write a cached bundle, bracketed by the change
    /// notifications. `apply` returns whether the score tag was touched and
    /// must be pushed to presentation state.
    fn mutate(
        &mut self,
        id: UserId,
        apply: impl FnOnce(&mut Bundle) -> bool,
    ) -> Result<(), EngineError> {
        if !self.is_active(id) {
            return Ok(());
        }

        let rules = self.rules.clone();
        let mut bundle = self.cache.get_or_create(id, false, &rules, &self.oracle)?;

        self.hooks.changed_pre(id, &bundle);
        let push_score = apply(&mut bundle);
        self.cache.store(id, bundle.clone())?;

        if push_score {
            let badge = bundle.score_tag.clone();
            if let Err(err) = self.push_badge(id, &badge) {
                warn!(%id, "badge push failed after attribute mutation: {err}");
            }
        }

        self.hooks.changed_post(id, &bundle);
        Ok(())
    }

    /// The identity's preference fields, from cache when present, otherwise
    /// freshly resolved. Unknown identities yield the neutral defaults.
    fn preferences(&mut self, id: UserId) -> Result<Bundle, EngineError> {
        if !self.is_active(id) {
            return Ok(Bundle::default());
        }

        let rules = self.rules.clone();
        Ok(self.cache.get_or_create(id, false, &rules, &self.oracle)?)
    }

    fn push_badge(&mut self, id: UserId, badge: &str) -> Result<(), PresentationError> {
        if self.applied.get(&id).is_some_and(|applied| applied == badge) {
            return Ok(());
        }

        self.sink.set_badge(id, badge)?;
        self.applied.insert(id, badge.to_string());
        Ok(())
    }

    fn is_active(&self, id: UserId) -> bool {
        id.is_valid() && self.joined.contains_key(&id)
    }

    fn within_warmup(&self, id: UserId) -> bool {
        self.joined
            .get(&id)
            .is_some_and(|joined| joined.elapsed() <= self.config.permission_warmup)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use regalia_core::test_utils::StaticOracle;
    use regalia_core::{Attributes, Bundle, Placement, Rule, RuleSet, UserId};
    use tokio::time::advance;

    use crate::config::Config;
    use crate::engine::{Engine, EngineBuilder, EngineError};
    use crate::hooks::HookOutcome;
    use crate::message::{ChatRequest, ChatVerdict};
    use crate::team::Team;
    use crate::test_utils::RecordingSink;

    const ID: UserId = UserId::new(76561197960265728);

    fn rule(token: &str, score_tag: &str) -> Rule {
        Rule {
            token: token.to_string(),
            bundle: Bundle {
                score_tag: score_tag.to_string(),
                ..Default::default()
            },
        }
    }

    fn vip_rules() -> RuleSet {
        RuleSet::new(Bundle::default(), vec![rule("vip", "[VIP]")])
    }

    fn spawn_engine(rules: RuleSet, oracle: &StaticOracle, sink: &RecordingSink) -> Engine {
        EngineBuilder::new(oracle.clone())
            .rules(rules)
            .presentation(sink.clone())
            .spawn()
    }

    fn chat_request(text: &str) -> ChatRequest {
        ChatRequest {
            id: ID,
            name: "player".to_string(),
            text: text.to_string(),
            team_only: false,
            alive: true,
        }
    }

    /// Wait until the actor has drained its inbox and run any due timer
    /// work. Two round trips: the first lets the actor consume pending
    /// messages, leaving the inbox empty so due interval ticks run, the
    /// second fences behind that tick work.
    async fn settle(engine: &Engine) {
        for _ in 0..2 {
            engine
                .chat_sound(UserId::new(u64::MAX))
                .await
                .expect("engine alive");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_applies_the_resolved_badge() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        settle(&engine).await;

        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));
        assert_eq!(sink.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_revocation_is_applied_within_one_interval() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));

        oracle.revoke(ID, "vip");
        advance(Duration::from_millis(1100)).await;
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some(""));

        // The default was not locked in: a re-grant surfaces on the next
        // revalidation tick without any lifecycle event.
        oracle.grant(ID, "vip");
        advance(Duration::from_millis(1000)).await;
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));
    }

    #[tokio::test(start_paused = true)]
    async fn revalidation_does_not_push_redundant_updates() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        settle(&engine).await;
        assert_eq!(sink.call_count(), 1);

        advance(Duration::from_secs(5)).await;
        settle(&engine).await;
        assert_eq!(sink.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_identities_present_the_default_badge() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        engine.set_visibility(ID, false).await.expect("engine alive");
        settle(&engine).await;

        assert_eq!(sink.badge(ID).as_deref(), Some(""));
        assert!(!engine.visibility(ID).await.expect("engine alive"));

        // The preference survives revalidation ticks.
        advance(Duration::from_secs(3)).await;
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some(""));
        assert!(!engine.visibility(ID).await.expect("engine alive"));

        engine.set_visibility(ID, true).await.expect("engine alive");
        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_forces_recomputation_but_spawn_outside_does_not() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");

        let config = Config {
            permission_warmup: Duration::from_secs(1),
            revalidate_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let rules = RuleSet::new(
            Bundle::default(),
            vec![rule("admin", "[ADMIN]"), rule("vip", "[VIP]")],
        );
        let engine = EngineBuilder::new(oracle.clone())
            .config(config)
            .rules(rules)
            .presentation(sink.clone())
            .spawn();

        engine.connected(ID).await.expect("engine alive");
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));

        // Leave the warm-up window, then grant an earlier, stronger rule.
        advance(Duration::from_secs(2)).await;
        settle(&engine).await;
        oracle.grant(ID, "admin");

        // An unforced spawn is served from the cache.
        engine.spawned(ID).await.expect("engine alive");
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));
        assert_eq!(sink.call_count(), 1);

        // A team change always forces recomputation.
        engine
            .team_changed(ID, Team::Defenders)
            .await
            .expect("engine alive");
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some("[ADMIN]"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_sink_failures_retry_up_to_the_budget() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");

        let config = Config {
            apply_max_attempts: 3,
            apply_retry_delay: Duration::from_millis(200),
            revalidate_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let engine = EngineBuilder::new(oracle.clone())
            .config(config)
            .rules(vip_rules())
            .presentation(sink.clone())
            .spawn();

        sink.fail_next(3);
        engine.connected(ID).await.expect("engine alive");
        settle(&engine).await;

        for _ in 0..30 {
            advance(Duration::from_millis(200)).await;
            settle(&engine).await;
        }

        // Exactly the budget was spent, then the chain gave up.
        assert_eq!(sink.attempt_count(), 3);
        assert_eq!(sink.call_count(), 0);

        // Retry exhaustion is not fatal: the next lifecycle event succeeds.
        engine.spawned(ID).await.expect("engine alive");
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_then_get_returns_the_resolved_default() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        engine
            .set_attribute(ID, Attributes::SCORE_TAG, "[CUSTOM]")
            .await
            .expect("engine alive");
        assert_eq!(
            engine
                .attribute(ID, Attributes::SCORE_TAG)
                .await
                .expect("engine alive")
                .as_deref(),
            Some("[CUSTOM]")
        );

        engine
            .reset_attribute(ID, Attributes::SCORE_TAG)
            .await
            .expect("engine alive");
        assert_eq!(
            engine
                .attribute(ID, Attributes::SCORE_TAG)
                .await
                .expect("engine alive")
                .as_deref(),
            Some("")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn add_composes_against_the_existing_value() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        engine
            .set_attribute(ID, Attributes::CHAT_TAG, "A")
            .await
            .expect("engine alive");
        engine
            .add_attribute(ID, Attributes::CHAT_TAG, Placement::Before, "B")
            .await
            .expect("engine alive");
        assert_eq!(
            engine
                .attribute(ID, Attributes::CHAT_TAG)
                .await
                .expect("engine alive")
                .as_deref(),
            Some("BA")
        );

        engine
            .add_attribute(ID, Attributes::CHAT_TAG, Placement::After, "C")
            .await
            .expect("engine alive");
        assert_eq!(
            engine
                .attribute(ID, Attributes::CHAT_TAG)
                .await
                .expect("engine alive")
                .as_deref(),
            Some("BAC")
        );

        engine
            .add_attribute(ID, Attributes::CHAT_TAG, Placement::Replace, "Z")
            .await
            .expect("engine alive");
        assert_eq!(
            engine
                .attribute(ID, Attributes::CHAT_TAG)
                .await
                .expect("engine alive")
                .as_deref(),
            Some("Z")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn chat_messages_are_formatted_with_resolved_attributes() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");

        let rules = RuleSet::new(
            Bundle::default(),
            vec![Rule {
                token: "vip".to_string(),
                bundle: Bundle {
                    score_tag: "[VIP]".to_string(),
                    chat_tag: "{gold}[VIP] ".to_string(),
                    name_color: "[teamcolor]".to_string(),
                    message_color: "{green}".to_string(),
                    ..Default::default()
                },
            }],
        );
        let engine = spawn_engine(rules, &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        engine
            .team_changed(ID, Team::Attackers)
            .await
            .expect("engine alive");
        engine.set_chat_sound(ID, false).await.expect("engine alive");

        let verdict = engine
            .chat(chat_request("hi {red}there"))
            .await
            .expect("engine alive");
        match verdict {
            ChatVerdict::Deliver(delivery) => {
                assert_eq!(delivery.name, "\u{10}[VIP] \u{10}player");
                assert_eq!(delivery.text, "\u{04}hi there");
                assert!(!delivery.chat_sound);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_senders_chat_with_the_default_identity() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");

        let rules = RuleSet::new(
            Bundle::default(),
            vec![Rule {
                token: "vip".to_string(),
                bundle: Bundle {
                    score_tag: "[VIP]".to_string(),
                    chat_tag: "[VIP] ".to_string(),
                    ..Default::default()
                },
            }],
        );
        let engine = spawn_engine(rules, &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        engine.set_visibility(ID, false).await.expect("engine alive");
        engine.set_chat_sound(ID, false).await.expect("engine alive");

        let verdict = engine.chat(chat_request("hello")).await.expect("engine alive");
        match verdict {
            ChatVerdict::Deliver(delivery) => {
                // Default display fields, but the sender's own preferences.
                assert_eq!(delivery.name, "player");
                assert!(!delivery.chat_sound);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pre_stage_stop_suppresses_the_message() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        let process_ran = Arc::new(AtomicUsize::new(0));
        engine.hooks().on_message_pre(|_| HookOutcome::Stop);
        let process_ran_clone = process_ran.clone();
        engine.hooks().on_message_process(move |_| {
            process_ran_clone.fetch_add(1, Ordering::SeqCst);
            HookOutcome::Continue
        });

        engine.connected(ID).await.expect("engine alive");
        let verdict = engine.chat(chat_request("hello")).await.expect("engine alive");

        assert_eq!(verdict, ChatVerdict::Suppressed);
        assert_eq!(process_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn faulting_observer_drops_the_message_but_not_the_engine() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.hooks().on_message_pre(|_| panic!("misbehaving observer"));

        engine.connected(ID).await.expect("engine alive");
        let verdict = engine.chat(chat_request("hello")).await.expect("engine alive");
        assert_eq!(verdict, ChatVerdict::Suppressed);

        // The actor survived the fault and keeps serving requests.
        assert!(engine.visibility(ID).await.expect("engine alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn blank_messages_are_suppressed_before_any_stage() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        let pre_ran = Arc::new(AtomicUsize::new(0));
        let pre_ran_clone = pre_ran.clone();
        engine.hooks().on_message_pre(move |_| {
            pre_ran_clone.fetch_add(1, Ordering::SeqCst);
            HookOutcome::Continue
        });

        engine.connected(ID).await.expect("engine alive");
        let verdict = engine
            .chat(chat_request("{red}\u{01}"))
            .await
            .expect("engine alive");

        assert_eq!(verdict, ChatVerdict::Suppressed);
        assert_eq!(pre_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn chat_from_unknown_identities_passes_through_untouched() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        let verdict = engine.chat(chat_request("hello")).await.expect("engine alive");
        assert_eq!(verdict, ChatVerdict::Untouched);
    }

    #[tokio::test(start_paused = true)]
    async fn change_notifications_bracket_mutations() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_pre = seen.clone();
        engine.hooks().on_changed_pre(move |_, bundle| {
            seen_pre
                .lock()
                .unwrap()
                .push(("pre", bundle.score_tag.clone()));
        });
        let seen_post = seen.clone();
        engine.hooks().on_changed_post(move |_, bundle| {
            seen_post
                .lock()
                .unwrap()
                .push(("post", bundle.score_tag.clone()));
        });

        engine.connected(ID).await.expect("engine alive");
        engine
            .set_attribute(ID, Attributes::SCORE_TAG, "A")
            .await
            .expect("engine alive");
        engine
            .set_attribute(ID, Attributes::SCORE_TAG, "B")
            .await
            .expect("engine alive");

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[
                ("pre", String::new()),
                ("post", "A".to_string()),
                ("pre", "A".to_string()),
                ("post", "B".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_drops_all_state() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        settle(&engine).await;
        let calls_before = sink.call_count();

        engine.disconnected(ID).await.expect("engine alive");
        settle(&engine).await;

        // Disconnected identities are no longer revalidated or processed.
        advance(Duration::from_secs(3)).await;
        settle(&engine).await;
        assert_eq!(sink.call_count(), calls_before);
        assert_eq!(
            engine
                .attribute(ID, Attributes::SCORE_TAG)
                .await
                .expect("engine alive"),
            None
        );
        assert_eq!(
            engine.chat(chat_request("hello")).await.expect("engine alive"),
            ChatVerdict::Untouched
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rule_reload_reapplies_badges() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        oracle.grant(ID, "vip");
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.connected(ID).await.expect("engine alive");
        settle(&engine).await;
        assert_eq!(sink.badge(ID).as_deref(), Some("[VIP]"));

        let reloaded = RuleSet::new(Bundle::default(), vec![rule("vip", "[MVP]")]);
        engine.reload_rules(reloaded).await.expect("engine alive");
        assert_eq!(sink.badge(ID).as_deref(), Some("[MVP]"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_actor() {
        let oracle = StaticOracle::default();
        let sink = RecordingSink::new();
        let engine = spawn_engine(vip_rules(), &oracle, &sink);

        engine.clone().shutdown().await.expect("clean shutdown");

        let result = engine.visibility(ID).await;
        assert!(matches!(result, Err(EngineError::Shutdown)));
    }
}
