// SPDX-License-Identifier: MIT OR Apache-2.0

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// The resolved display identity of one user.
///
/// The four string fields are "resolved attributes": they always reflect the
/// currently matching rule and are replaced wholesale on recomputation.
/// `chat_sound` and `visible` are user preferences which survive
/// recomputation (see [`Bundle::adopt_preferences`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bundle {
    /// Shown on the scoreboard in place of a clan tag.
    pub score_tag: String,

    /// Prefix inserted before the user's name in chat.
    pub chat_tag: String,

    /// Color token applied to the user's name in chat.
    pub name_color: String,

    /// Color token applied to the user's message body.
    pub message_color: String,

    /// Whether this user's messages play a notification sound.
    pub chat_sound: bool,

    /// Whether this user's tag and chat formatting are shown at all. When
    /// false the default bundle's score tag is presented instead.
    pub visible: bool,
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            score_tag: String::new(),
            chat_tag: String::new(),
            name_color: String::new(),
            message_color: String::new(),
            chat_sound: true,
            visible: true,
        }
    }
}

impl Bundle {
    /// Compare the four resolved display fields, ignoring user preferences.
    ///
    /// This is the equality used for change suppression and for the
    /// "never cache a default bundle" policy.
    pub fn content_eq(&self, other: &Bundle) -> bool {
        self.score_tag == other.score_tag
            && self.chat_tag == other.chat_tag
            && self.name_color == other.name_color
            && self.message_color == other.message_color
    }

    /// Carry over user preferences from a previously cached bundle.
    ///
    /// Resolved attributes always track the current rules; only preferences
    /// the user has set survive recomputation.
    pub fn adopt_preferences(&mut self, cached: &Bundle) {
        self.chat_sound = cached.chat_sound;
        self.visible = cached.visible;
    }

    /// Read the field selected by `kind`, or `None` unless exactly one
    /// attribute bit is set.
    pub fn attribute(&self, kind: Attributes) -> Option<&str> {
        if kind == Attributes::SCORE_TAG {
            Some(&self.score_tag)
        } else if kind == Attributes::CHAT_TAG {
            Some(&self.chat_tag)
        } else if kind == Attributes::NAME_COLOR {
            Some(&self.name_color)
        } else if kind == Attributes::MESSAGE_COLOR {
            Some(&self.message_color)
        } else {
            None
        }
    }

    /// Overwrite every field selected by `kinds`.
    pub fn set_attributes(&mut self, kinds: Attributes, value: &str) {
        if kinds.contains(Attributes::SCORE_TAG) {
            self.score_tag = value.to_string();
        }
        if kinds.contains(Attributes::CHAT_TAG) {
            self.chat_tag = value.to_string();
        }
        if kinds.contains(Attributes::NAME_COLOR) {
            self.name_color = value.to_string();
        }
        if kinds.contains(Attributes::MESSAGE_COLOR) {
            self.message_color = value.to_string();
        }
    }
}

bitflags! {
    /// Selector for the four resolved attribute fields of a [`Bundle`].
    ///
    /// Mutator operations take a set so one call can touch several fields.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const SCORE_TAG = 1;
        const CHAT_TAG = 1 << 1;
        const NAME_COLOR = 1 << 2;
        const MESSAGE_COLOR = 1 << 3;
    }
}

/// Where a composed value lands relative to the existing field content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    /// Prepend to the existing value.
    Before,
    /// Append to the existing value.
    After,
    /// Overwrite the existing value.
    #[default]
    Replace,
}

/// Compose a new attribute value with an existing one.
pub fn compose(placement: Placement, old: &str, new: &str) -> String {
    match placement {
        Placement::Before => format!("{new}{old}"),
        Placement::After => format!("{old}{new}"),
        Placement::Replace => new.to_string(),
    }
}
