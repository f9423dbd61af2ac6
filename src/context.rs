//! The value bag carried between pipeline stages and the engine.
//!
//! The host framework owns request/response plumbing; the core only
//! reads and writes these fields. The Axum adapter in
//! [`middleware`](crate::middleware) builds one of these per request.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::AuthError;
use crate::session::{Session, Tokens};
use crate::transport::SetCookie;
use crate::types::{SessionId, TransportMode, UserId};

/// Per-request in/out values.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Inbound `Authorization` header value (with or without the
    /// `Bearer ` prefix).
    pub authorization: Option<String>,
    /// Inbound request cookies.
    pub req_cookies: HashMap<String, String>,
    /// Authenticated subject; set by the host on login, or by the
    /// pipeline after token validation.
    pub user_id: Option<UserId>,
    /// Transport the session's tokens use.
    pub token_signature_transport: Option<TransportMode>,
    pub session: Option<Session>,
    /// Token pair emitted by the engine on login/refresh.
    pub tokens: Option<Tokens>,
    /// Reassembled full bearer token.
    pub bearer_token: Option<String>,
    /// Verified claims of the bearer token.
    pub bearer_token_payload: Option<Map<String, Value>>,
    /// First authentication failure; once set the context is halted.
    pub auth_error: Option<AuthError>,
    pub halted: bool,
    /// Cookies the host must apply to the response.
    pub resp_cookies: Vec<SetCookie>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for an inbound request carrying a bearer token.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            authorization: Some(token.into()),
            ..Self::default()
        }
    }

    /// Context for a just-authenticated user (login flow, before
    /// [`upsert_session`](crate::SessionEngine::upsert_session)).
    #[must_use]
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Attach an inbound request cookie.
    #[must_use]
    pub fn with_req_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.req_cookies.insert(name.into(), value.into());
        self
    }

    /// Record an authentication failure and halt. The first failure
    /// wins; later stages must not run on a halted context.
    pub(crate) fn halt(&mut self, error: AuthError) {
        if self.auth_error.is_none() {
            self.auth_error = Some(error);
        }
        self.halted = true;
    }

    #[must_use]
    pub fn current_user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.id)
    }

    /// The inbound token with any `Bearer ` prefix stripped.
    #[must_use]
    pub(crate) fn raw_token(&self) -> Option<&str> {
        let header = self.authorization.as_deref()?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        if token.is_empty() { None } else { Some(token) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_token_strips_bearer_prefix() {
        let ctx = RequestContext::bearer("Bearer a.b.c");
        assert_eq!(ctx.raw_token(), Some("a.b.c"));

        let ctx = RequestContext::bearer("a.b.c");
        assert_eq!(ctx.raw_token(), Some("a.b.c"));

        let ctx = RequestContext::bearer("Bearer ");
        assert_eq!(ctx.raw_token(), None);

        let ctx = RequestContext::new();
        assert_eq!(ctx.raw_token(), None);
    }

    #[test]
    fn halt_keeps_first_error() {
        let mut ctx = RequestContext::new();
        ctx.halt(AuthError::Expired);
        ctx.halt(AuthError::SessionNotFound);

        assert!(ctx.halted);
        assert_eq!(ctx.auth_error, Some(AuthError::Expired));
    }
}
