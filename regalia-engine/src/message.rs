// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message types flowing through the engine.
use regalia_core::{Bundle, UserId};

use crate::team::Team;

/// An outgoing chat message as handed over by the transport, before any
/// processing.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    /// Sender identity.
    pub id: UserId,

    /// Raw sender name as the transport knows it.
    pub name: String,

    /// Raw message text, still carrying whatever the player typed.
    pub text: String,

    /// Whether the message goes to the sender's team only.
    pub team_only: bool,

    /// Whether the sender is currently alive.
    pub alive: bool,
}

/// The mutable payload passed through the message pipeline stages.
///
/// Observers may rewrite any field; `name` and `text` start raw (`text`
/// already sanitized) and are replaced with their formatted forms between
/// the `pre` and `process` stages.
#[derive(Clone, Debug)]
pub struct MessageContext {
    pub id: UserId,

    /// The sender's display identity for this message. When the sender has
    /// hidden their tags this carries the default bundle's display fields
    /// while the preference fields remain the sender's own.
    pub bundle: Bundle,

    pub name: String,
    pub text: String,
    pub team: Team,
    pub team_message: bool,

    /// Whether delivery should play a notification sound. Initialized from
    /// the sender's preference.
    pub chat_sound: bool,
}

/// Result of processing one outgoing chat message.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatVerdict {
    /// Deliver the formatted message.
    Deliver(ChatDelivery),

    /// The engine declined to process (unknown or system sender); the
    /// transport should pass the original message through untouched.
    Untouched,

    /// The message was vetoed and must not be delivered.
    Suppressed,
}

/// The formatted message parts handed back to the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatDelivery {
    pub name: String,
    pub text: String,
    pub chat_sound: bool,
}

impl ChatDelivery {
    /// Render the single chat line as the transport expects it.
    pub fn format_line(&self) -> String {
        format!(" {}\u{01}: {}", self.name, self.text)
    }
}
