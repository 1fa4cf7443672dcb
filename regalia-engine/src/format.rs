// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat text formatting: color-token translation and message construction.
//!
//! Color names are written as `{name}` tokens in configuration and rewritten
//! to the single control characters the chat transport understands.
//! Translation is idempotent: control characters are never re-interpreted
//! and unknown `{...}` spans pass through untouched, so translating already
//! translated text leaves it unchanged.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::team::Team;

/// The `[teamcolor]` placeholder, replaced with the sender team's color.
const TEAM_COLOR_PLACEHOLDER: &str = "[teamcolor]";

/// Strip player-controlled markup from raw chat text.
///
/// Removes `{...}` spans (so a player can not smuggle color tokens into
/// their message) and all control characters.
pub fn sanitize(text: &str) -> String {
    static MARKUP: Lazy<Regex> = Lazy::new(|| {
        // Unwrap as we checked the regular expression for correctness
        Regex::new(r"\{.*?\}|\p{C}").unwrap()
    });

    MARKUP.replace_all(text, "").trim().to_string()
}

/// Map a color token name (without braces, any case) to its chat control
/// character.
fn color_code(name: &str) -> Option<char> {
    let code = match name.to_ascii_lowercase().as_str() {
        "default" | "white" => '\u{01}',
        "darkred" => '\u{02}',
        "purple" | "team" => '\u{03}',
        "green" => '\u{04}',
        "olive" => '\u{05}',
        "lime" => '\u{06}',
        "red" => '\u{07}',
        "grey" | "gray" => '\u{08}',
        "yellow" => '\u{09}',
        "silver" => '\u{0A}',
        "blue" => '\u{0B}',
        "darkblue" => '\u{0C}',
        "magenta" => '\u{0E}',
        "lightred" => '\u{0F}',
        "gold" | "orange" => '\u{10}',
        _ => return None,
    };
    Some(code)
}

/// Rewrite every known `{color}` token to its control character.
///
/// Unknown tokens are left literally in place.
pub fn translate_colors(text: &str) -> String {
    static TOKEN: Lazy<Regex> = Lazy::new(|| {
        // Unwrap as we checked the regular expression for correctness
        Regex::new(r"\{([A-Za-z]+)\}").unwrap()
    });

    TOKEN
        .replace_all(text, |caps: &regex::Captures| match color_code(&caps[1]) {
            Some(code) => code.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Substitute the team-color placeholder, then translate color tokens.
pub fn replace_tags(text: &str, team: Team) -> String {
    let replaced = if text.contains(TEAM_COLOR_PLACEHOLDER) {
        text.replace(TEAM_COLOR_PLACEHOLDER, &team.color().to_string())
    } else {
        text.to_string()
    };
    translate_colors(&replaced)
}

/// Build the fully formatted display name of a chat message sender.
///
/// Concatenates, in order: the dead/spectator/team prefix, the optional
/// team-name token, the sender's chat tag, the sender's name color and the
/// raw name, then resolves team-color and color tokens.
pub fn format_display_name(
    team: Team,
    prefix: &str,
    team_name: &str,
    chat_tag: &str,
    name_color: &str,
    name: &str,
) -> String {
    let joined = [prefix, team_name, chat_tag, name_color, name].concat();
    replace_tags(&joined, team)
}

/// Build the fully formatted message body.
pub fn format_body(team: Team, message_color: &str, text: &str) -> String {
    let joined = [message_color, text].concat();
    replace_tags(&joined, team)
}

#[cfg(test)]
mod tests {
    use crate::team::Team;

    use super::{format_body, format_display_name, replace_tags, sanitize, translate_colors};

    #[test]
    fn sanitize_strips_markup_and_control_characters() {
        assert_eq!(sanitize("hello {red}world"), "hello world");
        assert_eq!(sanitize("hi\u{01}\u{10}there"), "hithere");
        assert_eq!(sanitize("{unclosed"), "{unclosed");
        assert_eq!(sanitize("  {a}{b}  "), "");
    }

    #[test]
    fn translates_known_tokens_and_keeps_unknown_ones() {
        assert_eq!(translate_colors("{red}hi"), "\u{07}hi");
        assert_eq!(translate_colors("{RED}hi"), "\u{07}hi");
        assert_eq!(translate_colors("{nosuchcolor}hi"), "{nosuchcolor}hi");
    }

    #[test]
    fn translation_is_idempotent() {
        let once = translate_colors("{gold}[VIP] {default}name");
        let twice = translate_colors(&once);
        assert_eq!(once, twice);

        let team_once = replace_tags("[teamcolor]name", Team::Attackers);
        let team_twice = replace_tags(&team_once, Team::Attackers);
        assert_eq!(team_once, team_twice);
    }

    #[test]
    fn team_color_placeholder_follows_the_sender_team() {
        assert_eq!(replace_tags("[teamcolor]x", Team::Defenders), "\u{0B}x");
        assert_eq!(replace_tags("[teamcolor]x", Team::Spectators), "\u{03}x");
        assert_eq!(replace_tags("[teamcolor]x", Team::Unassigned), "\u{01}x");
    }

    #[test]
    fn display_name_concatenates_in_order() {
        let name = format_display_name(
            Team::Attackers,
            "*DEAD* ",
            "(Attackers)",
            "{gold}[VIP] ",
            "[teamcolor]",
            "player",
        );
        assert_eq!(name, "*DEAD* (Attackers)\u{10}[VIP] \u{10}player");
    }

    #[test]
    fn body_is_prefixed_with_the_message_color() {
        assert_eq!(
            format_body(Team::Defenders, "{green}", "hello"),
            "\u{04}hello"
        );
    }
}
