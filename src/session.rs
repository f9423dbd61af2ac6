//! The persistent authentication record and the token pair derived from it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{SessionId, SessionType, TokenId, TransportMode, UserId};

/// Current epoch seconds.
pub(crate) fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Absolute end of a session's life, or never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    At(i64),
    Never,
}

impl Expiry {
    /// `min(self, t)`, treating `Never` as infinity.
    #[must_use]
    pub fn min_with(self, t: i64) -> i64 {
        match self {
            Self::At(at) => at.min(t),
            Self::Never => t,
        }
    }
}

/// A server-side record of a user's authenticated presence.
///
/// Identified by `(user_id, session_type, id)`. Mutated only by the
/// engine through the store's optimistic-locking upsert; a session whose
/// `refresh_expires_at` has passed is logically deleted and readers
/// return nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    #[serde(default)]
    pub session_type: SessionType,
    /// How this session's clients send token signatures.
    #[serde(default)]
    pub transport: TransportMode,
    pub created_at: i64,
    pub refreshed_at: i64,
    pub expires_at: Expiry,
    /// End of the current refresh window; always
    /// `min(expires_at, refreshed_at + refresh_token_ttl)`.
    pub refresh_expires_at: i64,
    /// `jti` of the currently-issued refresh token (the current generation).
    pub refresh_token_id: TokenId,
    /// Instant the current refresh-token generation was minted.
    pub tokens_fresh_from: i64,
    /// Instant the previous generation was minted; 0 means none.
    pub prev_tokens_fresh_from: i64,
    /// Optimistic-concurrency counter; strictly increases on every
    /// successful upsert.
    pub lock_version: u64,
    /// Opaque user-defined claims merged into access tokens.
    #[serde(default)]
    pub extra_payload: Map<String, Value>,
}

impl Session {
    /// Logically deleted?
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.refresh_expires_at < now
    }

    /// Guard against key collisions and stale reads: a stored blob only
    /// counts if it belongs to the caller's `(user_id, session_type)`.
    #[must_use]
    pub fn belongs_to(&self, user_id: &UserId, session_type: &SessionType) -> bool {
        &self.user_id == user_id && &self.session_type == session_type
    }
}

/// Token pair emitted on a successful login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tokens {
    /// In cookie transport this is the `header.payload` half; the
    /// signature rides separately.
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_exp: i64,
    pub refresh_token_exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn fixture(now: i64) -> Session {
        Session {
            id: SessionId::from("01J0000000000000000000TEST"),
            user_id: UserId::from("1"),
            session_type: SessionType::full(),
            transport: TransportMode::Bearer,
            created_at: now,
            refreshed_at: now,
            expires_at: Expiry::At(now + 1000),
            refresh_expires_at: now + 100,
            refresh_token_id: TokenId::from("rt-1".to_string()),
            tokens_fresh_from: now,
            prev_tokens_fresh_from: 0,
            lock_version: 0,
            extra_payload: Map::new(),
        }
    }

    #[test]
    fn expiry_min_with_treats_never_as_infinite() {
        assert_eq!(Expiry::At(50).min_with(100), 50);
        assert_eq!(Expiry::At(200).min_with(100), 100);
        assert_eq!(Expiry::Never.min_with(100), 100);
    }

    #[test]
    fn expired_iff_refresh_window_passed() {
        let s = fixture(1000);
        assert!(!s.is_expired(1100));
        assert!(s.is_expired(1101));
    }

    #[test]
    fn belongs_to_checks_both_user_and_type() {
        let s = fixture(1000);
        assert!(s.belongs_to(&UserId::from("1"), &SessionType::full()));
        assert!(!s.belongs_to(&UserId::from("2"), &SessionType::full()));
        assert!(!s.belongs_to(&UserId::from("1"), &SessionType::from("stepped_up")));
    }

    #[test]
    fn session_serde_roundtrip() {
        let s = fixture(1000);
        let json = serde_json::to_vec(&s).unwrap();
        let parsed: Session = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
