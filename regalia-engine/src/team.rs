// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// Team affiliation of a connected user, as reported by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    #[default]
    Unassigned,
    Spectators,
    Defenders,
    Attackers,
}

impl Team {
    /// The chat control character rendering this team's color.
    ///
    /// Substituted for the `[teamcolor]` placeholder during message
    /// formatting.
    pub fn color(&self) -> char {
        match self {
            Team::Unassigned => '\u{01}',
            Team::Spectators => '\u{03}',
            Team::Defenders => '\u{0B}',
            Team::Attackers => '\u{10}',
        }
    }
}
