/// Token factory failures.
///
/// Signature and structural problems only; claim semantics are the
/// pipeline's job and surface as [`AuthError`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
    #[error("bad signature")]
    BadSignature,
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Session store backend failures.
///
/// Only genuine I/O or backend trouble lands here. "Not found", stale
/// reads, and at-rest integrity failures are all expressed as `None`
/// results, never as errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("session store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

/// Authentication failures surfaced on the request context.
///
/// The `Display` strings are stable and user-visible; integrations match
/// on them, so changing one is a breaking change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("bearer token not found")]
    TokenNotFound,
    #[error("bearer token signature cookie not found")]
    SignatureCookieNotFound,
    #[error("bearer token invalid")]
    TokenInvalid,
    #[error("bearer token not yet valid")]
    NotYetValid,
    #[error("bearer token expired")]
    Expired,
    #[error("bearer token claim {0} not found")]
    ClaimNotFound(&'static str),
    #[error("bearer token claim type invalid")]
    InvalidType,
    #[error("bearer token claim sub, sid or styp not found")]
    IdentityClaimsNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("token stale")]
    TokenStale,
}

/// Top-level library error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup; refuse to boot.
    #[error("configuration error: {0}")]
    Config(String),
    /// Session creation was asked for on a context with no subject.
    #[error("session creation requires a user id on the context")]
    MissingUserId,
    #[error("token error: {0}")]
    Token(#[from] TokenError),
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_strings_are_stable() {
        assert_eq!(AuthError::TokenNotFound.to_string(), "bearer token not found");
        assert_eq!(
            AuthError::SignatureCookieNotFound.to_string(),
            "bearer token signature cookie not found"
        );
        assert_eq!(AuthError::NotYetValid.to_string(), "bearer token not yet valid");
        assert_eq!(AuthError::Expired.to_string(), "bearer token expired");
        assert_eq!(
            AuthError::ClaimNotFound("nbf").to_string(),
            "bearer token claim nbf not found"
        );
        assert_eq!(
            AuthError::InvalidType.to_string(),
            "bearer token claim type invalid"
        );
        assert_eq!(
            AuthError::IdentityClaimsNotFound.to_string(),
            "bearer token claim sub, sid or styp not found"
        );
        assert_eq!(AuthError::SessionNotFound.to_string(), "session not found");
        assert_eq!(AuthError::TokenStale.to_string(), "token stale");
    }
}
