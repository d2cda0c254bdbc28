//! Single-use password reset and setup tokens.
//!
//! Only an Argon2 hash of a token is stored. The plaintext leaves the process
//! exactly once, inside the link handed to the mailer.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::config::ActionTokenConfig;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTokenKind {
    /// Forgot-password flow.
    Reset,
    /// Invite flow for accounts created without a password.
    Setup,
}

impl ActionTokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Setup => "setup",
        }
    }

    /// `None` when the configured lifetime does not fit a `Duration`.
    #[must_use]
    pub fn ttl(self, config: &ActionTokenConfig) -> Option<Duration> {
        match self {
            Self::Reset => Duration::try_minutes(config.reset_ttl_minutes),
            Self::Setup => Duration::try_hours(config.setup_ttl_hours),
        }
    }

    /// `None` when the lifetime is out of range for a timestamp.
    #[must_use]
    pub fn expiry(self, config: &ActionTokenConfig, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.ttl(config)?)
    }

    /// Front-end route that accepts the token.
    #[must_use]
    pub const fn link_path(self) -> &'static str {
        match self {
            Self::Reset => "/reset-password",
            Self::Setup => "/setup-password",
        }
    }

    /// Builds the link sent to the user.
    #[must_use]
    pub fn link(self, public_url: &str, token: &str) -> String {
        format!(
            "{}{}?token={token}",
            public_url.trim_end_matches('/'),
            self.link_path()
        )
    }
}

impl fmt::Display for ActionTokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a random action token (64 character hex string)
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; TOKEN_BYTES] = rng.random();

    bytes.iter().fold(String::with_capacity(TOKEN_BYTES * 2), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Cheap shape check run before any hashing work.
#[must_use]
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(is_well_formed(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn well_formed_rejects_wrong_shapes() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed(&"a".repeat(63)));
        assert!(!is_well_formed(&"g".repeat(64)));
        assert!(is_well_formed(&"0f".repeat(32)));
    }

    #[test]
    fn ttls_follow_config() {
        let config = ActionTokenConfig::default();
        assert_eq!(ActionTokenKind::Reset.ttl(&config), Some(Duration::hours(1)));
        assert_eq!(ActionTokenKind::Setup.ttl(&config), Some(Duration::hours(24)));
    }

    #[test]
    fn oversized_ttl_has_no_expiry() {
        let config = ActionTokenConfig {
            setup_ttl_hours: 100_000_000_000,
            ..ActionTokenConfig::default()
        };
        assert_eq!(ActionTokenKind::Setup.ttl(&config), None);
        assert_eq!(ActionTokenKind::Setup.expiry(&config, Utc::now()), None);
        assert!(ActionTokenKind::Reset.expiry(&config, Utc::now()).is_some());
    }

    #[test]
    fn links_join_cleanly() {
        assert_eq!(
            ActionTokenKind::Reset.link("https://volunteers.example.org/", "abc"),
            "https://volunteers.example.org/reset-password?token=abc"
        );
        assert_eq!(
            ActionTokenKind::Setup.link("http://localhost:6790", "abc"),
            "http://localhost:6790/setup-password?token=abc"
        );
    }
}
