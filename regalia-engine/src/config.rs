// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the engine service.
//!
//! The retry budget and the permission warm-up window are tuned for
//! permission backends which load grants asynchronously after a user
//! connects; the defaults tolerate a backend that needs up to 40 seconds.
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::team::Team;

/// Default interval of the permission revalidation loop.
pub const DEFAULT_REVALIDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Default delay between apply-on-join retry attempts.
pub const DEFAULT_APPLY_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Default bound on apply-on-join retry attempts (200 * 200 ms = 40 s).
pub const DEFAULT_APPLY_MAX_ATTEMPTS: u32 = 200;

/// Default warm-up window after connect during which every attribute read is
/// forced past the cache.
pub const DEFAULT_PERMISSION_WARMUP: Duration = Duration::from_secs(40);

/// Configuration parameters for the engine service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// How often every connected identity is revalidated against the
    /// permission backend.
    pub revalidate_interval: Duration,

    /// Delay between attempts when badge application fails transiently.
    pub apply_retry_delay: Duration,

    /// Bound on automatic apply retries. Exhausting the budget is not an
    /// error; the next lifecycle event may still succeed.
    pub apply_max_attempts: u32,

    /// Time span after connect during which attribute reads always bypass
    /// the cache, tolerating slow external permission loads.
    pub permission_warmup: Duration,

    /// Chat formatting tables.
    pub chat: ChatConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            revalidate_interval: DEFAULT_REVALIDATE_INTERVAL,
            apply_retry_delay: DEFAULT_APPLY_RETRY_DELAY,
            apply_max_attempts: DEFAULT_APPLY_MAX_ATTEMPTS,
            permission_warmup: DEFAULT_PERMISSION_WARMUP,
            chat: ChatConfig::default(),
        }
    }
}

/// Formatting tables for outgoing chat messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Prefix shown for users who are neither alive nor spectating.
    pub dead_prefix: String,

    /// Per-team prefix token shown before the sender name.
    pub team_prefixes: HashMap<Team, String>,

    /// Per-team name token inserted for team-only messages.
    pub team_names: HashMap<Team, String>,
}

impl ChatConfig {
    pub fn team_prefix(&self, team: Team) -> &str {
        self.team_prefixes
            .get(&team)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn team_name(&self, team: Team) -> &str {
        self.team_names
            .get(&team)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        let team_prefixes = HashMap::from([
            (Team::Unassigned, String::new()),
            (Team::Spectators, "*SPEC* ".to_string()),
            (Team::Defenders, String::new()),
            (Team::Attackers, String::new()),
        ]);
        let team_names = HashMap::from([
            (Team::Unassigned, String::new()),
            (Team::Spectators, "(Spectators)".to_string()),
            (Team::Defenders, "(Defenders)".to_string()),
            (Team::Attackers, "(Attackers)".to_string()),
        ]);

        Self {
            dead_prefix: "*DEAD* ".to_string(),
            team_prefixes,
            team_names,
        }
    }
}
