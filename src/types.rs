use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Subject owning a session (opaque string).
///
/// Integer user ids work fine as their decimal rendering:
/// `UserId::from("426")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Session identifier (opaque string, globally unique).
///
/// Minted by the engine as a ULID; consumers treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Refresh-token generation identifier (the `jti` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Session namespace tag.
///
/// Permits multiple parallel sessions for the same user, e.g. a regular
/// `"full"` session next to a stepped-up one. Travels in tokens as the
/// `styp` claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionType(pub String);

impl SessionType {
    /// The default session namespace.
    #[must_use]
    pub fn full() -> Self {
        Self("full".to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionType {
    fn default() -> Self {
        Self::full()
    }
}

impl From<&str> for SessionType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// How a token's signature reaches the server.
///
/// Selected per-session at creation and recorded on the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Full three-segment token in `Authorization: Bearer <token>`.
    #[default]
    Bearer,
    /// `header.payload` in `Authorization`; the signature travels in an
    /// HTTP-only cookie.
    Cookie,
}

/// The two token kinds the pipeline can expect (the `type` claim).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
