//! Token validation pipeline.
//!
//! Ordered stages over a [`RequestContext`]: reassemble the token for
//! its transport, verify the signature, check temporal claims, check
//! the token kind, check identity claims, load the session, attach the
//! results. Each stage may halt the context with an [`AuthError`]; the
//! pipeline itself only fails for store backend trouble.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{AuthError, StoreError};
use crate::session::unix_now;
use crate::store::SessionStoreDyn;
use crate::token::{TokenFactoryDyn, claims};
use crate::transport;
use crate::types::{SessionId, SessionType, TokenKind, UserId};

/// Validates inbound bearer tokens of one expected kind.
///
/// Build via [`SessionEngine::pipeline`](crate::SessionEngine::pipeline).
/// Hosts typically keep two: an access pipeline guarding application
/// endpoints and a refresh pipeline in front of the refresh/logout
/// routes.
#[derive(Clone)]
pub struct TokenPipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<dyn SessionStoreDyn>,
    pub(crate) factory: Arc<dyn TokenFactoryDyn>,
    pub(crate) kind: TokenKind,
}

impl TokenPipeline {
    /// Run all stages. Authentication failures land on
    /// `ctx.auth_error` and halt the context; this function only
    /// returns `Err` when the session store itself fails.
    ///
    /// # Errors
    ///
    /// Store backend I/O failures.
    pub async fn validate(&self, ctx: &mut RequestContext) -> Result<(), StoreError> {
        if ctx.halted {
            return Ok(());
        }

        // 1. Reassemble the token for its transport.
        let raw = match ctx.raw_token() {
            Some(token) => token.to_owned(),
            None => {
                ctx.halt(AuthError::TokenNotFound);
                return Ok(());
            }
        };
        let signature_cookie = ctx.req_cookies.get(self.signature_cookie_name()).cloned();
        let token = match transport::reassemble(&raw, signature_cookie.as_deref()) {
            Ok(token) => token,
            Err(error) => {
                ctx.halt(error);
                return Ok(());
            }
        };

        // 2. Verify signature and structural form.
        let payload = match self.factory.verify_dyn(&token).await {
            Ok(payload) => payload,
            Err(error) => {
                tracing::debug!(%error, "bearer token rejected");
                ctx.halt(AuthError::TokenInvalid);
                return Ok(());
            }
        };

        // 3. Temporal claims.
        let now = unix_now();
        let Some(nbf) = payload.get(claims::NBF).and_then(Value::as_i64) else {
            ctx.halt(AuthError::ClaimNotFound("nbf"));
            return Ok(());
        };
        if nbf > now {
            ctx.halt(AuthError::NotYetValid);
            return Ok(());
        }
        let Some(exp) = payload.get(claims::EXP).and_then(Value::as_i64) else {
            ctx.halt(AuthError::ClaimNotFound("exp"));
            return Ok(());
        };
        if exp < now {
            ctx.halt(AuthError::Expired);
            return Ok(());
        }

        // 4. Token kind.
        let Some(kind) = payload.get(claims::TYPE) else {
            ctx.halt(AuthError::ClaimNotFound("type"));
            return Ok(());
        };
        if kind.as_str() != Some(self.kind.as_str()) {
            ctx.halt(AuthError::InvalidType);
            return Ok(());
        }

        // 5. Identity claims. `styp` defaults to the full namespace when
        // absent; `sub` may be a string or an integer.
        let sub = claim_string(&payload, claims::SUB);
        let sid = claim_string(&payload, claims::SID);
        let styp = match payload.get(claims::STYP) {
            None => Some(SessionType::full().0),
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => None,
        };
        let (Some(sub), Some(sid), Some(styp)) = (sub, sid, styp) else {
            ctx.halt(AuthError::IdentityClaimsNotFound);
            return Ok(());
        };

        // 6. Load the session.
        let user_id = UserId(sub);
        let session_id = SessionId(sid);
        let session_type = SessionType(styp);
        let Some(session) = self
            .store
            .get_dyn(&session_id, &user_id, &session_type)
            .await?
        else {
            ctx.halt(AuthError::SessionNotFound);
            return Ok(());
        };

        // 7. Attach.
        ctx.user_id = Some(session.user_id.clone());
        ctx.token_signature_transport = Some(session.transport);
        ctx.bearer_token = Some(token);
        ctx.bearer_token_payload = Some(payload);
        ctx.session = Some(session);
        Ok(())
    }

    fn signature_cookie_name(&self) -> &str {
        match self.kind {
            TokenKind::Access => &self.config.access_cookie_name,
            TokenKind::Refresh => &self.config.refresh_cookie_name,
        }
    }
}

/// Read a claim that identifies something: strings as-is, integers by
/// their decimal rendering.
fn claim_string(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::engine::{SessionEngine, UpsertOpts};
    use crate::keys::StaticKeyring;
    use crate::memory_store::MemoryStore;
    use crate::token::{Hs256TokenFactory, TokenFactory};
    use crate::types::TransportMode;

    fn engine() -> (SessionEngine, Hs256TokenFactory) {
        let ring = Arc::new(StaticKeyring::new("k1", [1u8; 32], [2u8; 32]).unwrap());
        let factory = Hs256TokenFactory::new(ring.clone());
        let engine = SessionEngine::new(
            Config::builder().token_issuer("test").build().unwrap(),
            MemoryStore::new(ring, "charon"),
            factory.clone(),
        );
        (engine, factory)
    }

    async fn sign(factory: &Hs256TokenFactory, payload: Value) -> String {
        factory
            .sign(payload.as_object().expect("object payload"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn claim_rejection_table() {
        let (engine, factory) = engine();
        let pipeline = engine.pipeline(TokenKind::Refresh);

        let cases: Vec<(fn(i64) -> Value, &str)> = vec![
            (|_| json!({"hi": "boom"}), "bearer token claim nbf not found"),
            (|now| json!({"nbf": now + 10}), "bearer token not yet valid"),
            (
                |now| json!({"nbf": now, "exp": now - 10}),
                "bearer token expired",
            ),
            // exp == now is still alive; the failure is the missing kind.
            (
                |now| json!({"nbf": now, "exp": now}),
                "bearer token claim type not found",
            ),
            (
                |now| json!({"nbf": now, "exp": now, "type": "bearer"}),
                "bearer token claim type invalid",
            ),
            (
                |now| json!({"nbf": now, "exp": now, "type": "refresh"}),
                "bearer token claim sub, sid or styp not found",
            ),
            // styp defaults to "full"; the session simply does not exist.
            (
                |now| json!({"nbf": now, "exp": now, "type": "refresh", "sub": 1, "sid": "a"}),
                "session not found",
            ),
        ];

        for (payload_at, expected) in cases {
            // Stamp each payload right before it is validated so the
            // exp == now rows sit exactly on the boundary they probe.
            let payload = payload_at(unix_now());
            let token = sign(&factory, payload.clone()).await;
            let mut ctx = RequestContext::bearer(format!("Bearer {token}"));
            pipeline.validate(&mut ctx).await.unwrap();

            assert!(ctx.halted, "{payload} must halt");
            assert_eq!(
                ctx.auth_error.as_ref().map(ToString::to_string).as_deref(),
                Some(expected),
                "payload {payload}"
            );
        }
    }

    #[tokio::test]
    async fn happy_path_access_token_in_bearer_mode() {
        let (engine, _) = engine();
        let mut login = RequestContext::for_user("1");
        engine.upsert_session(&mut login, UpsertOpts::default()).await.unwrap();
        let tokens = login.tokens.unwrap();

        let mut ctx = RequestContext::bearer(format!("Bearer {}", tokens.access_token));
        engine.pipeline(TokenKind::Access).validate(&mut ctx).await.unwrap();

        assert!(!ctx.halted);
        assert!(ctx.auth_error.is_none());
        assert_eq!(ctx.current_user_id(), Some(&UserId::from("1")));
        assert_eq!(ctx.session_id(), login.session.as_ref().map(|s| &s.id));
        let payload = ctx.bearer_token_payload.as_ref().unwrap();
        assert_eq!(payload.get("type").unwrap(), "access");
        assert_eq!(payload.get("iss").unwrap(), "test");
    }

    #[tokio::test]
    async fn happy_refresh_via_cookie_transport() {
        let (engine, _) = engine();
        let mut login = RequestContext::for_user("426");
        let opts = UpsertOpts { transport: TransportMode::Cookie, ..UpsertOpts::default() };
        engine.upsert_session(&mut login, opts).await.unwrap();

        let session = login.session.as_ref().unwrap();
        let tokens = login.tokens.as_ref().unwrap();
        let signature = login
            .resp_cookies
            .iter()
            .find(|c| c.name == "_refresh_token_signature")
            .map(|c| c.value.clone())
            .unwrap();

        let mut ctx = RequestContext::bearer(format!("Bearer {}", tokens.refresh_token))
            .with_req_cookie("_refresh_token_signature", signature);
        engine.pipeline(TokenKind::Refresh).validate(&mut ctx).await.unwrap();

        assert!(ctx.auth_error.is_none(), "got {:?}", ctx.auth_error);
        assert_eq!(ctx.current_user_id(), Some(&UserId::from("426")));
        assert_eq!(ctx.session_id(), Some(&session.id));
        let payload = ctx.bearer_token_payload.as_ref().unwrap();
        assert_eq!(payload.get("jti").unwrap(), &json!(session.refresh_token_id.0));
        assert_eq!(payload.get("type").unwrap(), "refresh");
    }

    #[tokio::test]
    async fn cookie_transport_without_the_cookie_fails() {
        let (engine, _) = engine();
        let mut login = RequestContext::for_user("1");
        let opts = UpsertOpts { transport: TransportMode::Cookie, ..UpsertOpts::default() };
        engine.upsert_session(&mut login, opts).await.unwrap();
        let tokens = login.tokens.unwrap();

        let mut ctx = RequestContext::bearer(format!("Bearer {}", tokens.refresh_token));
        engine.pipeline(TokenKind::Refresh).validate(&mut ctx).await.unwrap();

        assert_eq!(ctx.auth_error, Some(AuthError::SignatureCookieNotFound));
    }

    #[tokio::test]
    async fn missing_authorization_header_fails() {
        let (engine, _) = engine();
        let mut ctx = RequestContext::new();
        engine.pipeline(TokenKind::Access).validate(&mut ctx).await.unwrap();
        assert_eq!(ctx.auth_error, Some(AuthError::TokenNotFound));
    }

    #[tokio::test]
    async fn refresh_token_is_rejected_by_the_access_pipeline() {
        let (engine, _) = engine();
        let mut login = RequestContext::for_user("1");
        engine.upsert_session(&mut login, UpsertOpts::default()).await.unwrap();
        let tokens = login.tokens.unwrap();

        let mut ctx = RequestContext::bearer(format!("Bearer {}", tokens.refresh_token));
        engine.pipeline(TokenKind::Access).validate(&mut ctx).await.unwrap();

        assert_eq!(ctx.auth_error, Some(AuthError::InvalidType));
    }

    #[tokio::test]
    async fn tampered_token_is_invalid() {
        let (engine, _) = engine();
        let mut login = RequestContext::for_user("1");
        engine.upsert_session(&mut login, UpsertOpts::default()).await.unwrap();
        let mut token = login.tokens.unwrap().access_token;
        token.pop();

        let mut ctx = RequestContext::bearer(format!("Bearer {token}"));
        engine.pipeline(TokenKind::Access).validate(&mut ctx).await.unwrap();

        assert_eq!(ctx.auth_error, Some(AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn valid_token_for_a_deleted_session_fails() {
        let (engine, _) = engine();
        let mut login = RequestContext::for_user("1");
        engine.upsert_session(&mut login, UpsertOpts::default()).await.unwrap();
        let tokens = login.tokens.clone().unwrap();

        engine.logout(&mut login).await.unwrap();

        let mut ctx = RequestContext::bearer(format!("Bearer {}", tokens.access_token));
        engine.pipeline(TokenKind::Access).validate(&mut ctx).await.unwrap();

        assert_eq!(ctx.auth_error, Some(AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn halted_context_short_circuits() {
        let (engine, _) = engine();
        let mut ctx = RequestContext::new();
        ctx.halt(AuthError::Expired);

        engine.pipeline(TokenKind::Access).validate(&mut ctx).await.unwrap();
        assert_eq!(ctx.auth_error, Some(AuthError::Expired));
    }
}
