// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable numeric identity of a connected user.
///
/// The id stays the same across sessions (it is an account id, not a
/// transient connection handle). Its decimal string form is what literal
/// rules in a [`crate::RuleSet`] match against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The zero id identifies the system/world and never participates in
    /// per-user processing.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<UserId> for u64 {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let id = value
            .parse::<u64>()
            .map_err(|_| UserIdError::InvalidId(value.to_string()))?;
        Ok(Self(id))
    }
}

#[derive(Error, Debug)]
pub enum UserIdError {
    #[error("invalid user id string: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::UserId;

    #[test]
    fn display_matches_literal_form() {
        let id = UserId::new(76561197960265728);
        assert_eq!(id.to_string(), "76561197960265728");
        assert_eq!("76561197960265728".parse::<UserId>().unwrap(), id);
    }

    #[test]
    fn zero_id_is_invalid() {
        assert!(!UserId::new(0).is_valid());
        assert!(UserId::new(1).is_valid());
    }

    #[test]
    fn parse_rejects_non_numeric() {
        assert!("vip".parse::<UserId>().is_err());
        assert!("".parse::<UserId>().is_err());
    }
}
