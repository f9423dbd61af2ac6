//! The session lifecycle engine: create, rotate, revoke.
//!
//! Rotation keeps two refresh-token generations alive per session. The
//! *current* generation is the one identified by the session's
//! `refresh_token_id`; the *previous* generation is any refresh token
//! minted in `[prev_tokens_fresh_from, tokens_fresh_from)`. Presenting a
//! current token slides the window forward; presenting a previous one
//! re-mints tokens for the current generation without touching the
//! store, which makes refresh safe to retry and tolerant of clients
//! racing themselves.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use ulid::Ulid;

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{AuthError, Error, TokenError};
use crate::pipeline::TokenPipeline;
use crate::session::{Expiry, Session, Tokens, unix_now};
use crate::store::{SessionStore, SessionStoreDyn, Upsert};
use crate::token::{TokenFactory, TokenFactoryDyn, claims};
use crate::transport::{self, SetCookie};
use crate::types::{SessionId, SessionType, TokenId, TokenKind, TransportMode};

/// Options for [`SessionEngine::upsert_session`].
///
/// `session_type` and `transport` only matter at creation; rotation
/// keeps whatever the session was created with. `extra_payload` is
/// merged into the session on creation and on every window slide.
#[derive(Debug, Clone, Default)]
pub struct UpsertOpts {
    pub session_type: SessionType,
    pub transport: TransportMode,
    pub extra_payload: Map<String, Value>,
}

/// Creates, rotates, and revokes sessions.
///
/// Stateless per request; clone freely, clones share the underlying
/// store and factory.
#[derive(Clone)]
pub struct SessionEngine {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<dyn SessionStoreDyn>,
    pub(crate) factory: Arc<dyn TokenFactoryDyn>,
}

impl SessionEngine {
    pub fn new(config: Config, store: impl SessionStore, factory: impl TokenFactory) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            factory: Arc::new(factory),
        }
    }

    /// Build a validation pipeline that expects the given token kind.
    #[must_use]
    pub fn pipeline(&self, kind: TokenKind) -> TokenPipeline {
        TokenPipeline {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            factory: Arc::clone(&self.factory),
            kind,
        }
    }

    /// Create a session for `ctx.user_id`, or rotate the one attached to
    /// the context (put there by the refresh-token pipeline).
    ///
    /// On success the context carries the session, a fresh [`Tokens`]
    /// pair, and any signature cookies. A stale refresh token halts the
    /// context with [`AuthError::TokenStale`] instead.
    ///
    /// # Errors
    ///
    /// [`Error::MissingUserId`] when creating without a subject on the
    /// context; otherwise store/factory failures.
    pub async fn upsert_session(
        &self,
        ctx: &mut RequestContext,
        opts: UpsertOpts,
    ) -> Result<(), Error> {
        match ctx.session.take() {
            Some(session) => self.refresh(ctx, session, opts).await,
            None => self.create(ctx, opts).await,
        }
    }

    /// Delete the attached session and clear signature cookies.
    ///
    /// # Errors
    ///
    /// Store failures only; a context without a session just gets its
    /// cookies cleared.
    pub async fn logout(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        if let Some(session) = ctx.session.take() {
            self.store
                .delete_dyn(&session.id, &session.user_id, &session.session_type)
                .await?;
            tracing::info!(session_id = %session.id, user_id = %session.user_id, "session destroyed");
        }
        ctx.tokens = None;
        ctx.resp_cookies.push(SetCookie::removal(
            self.config.access_cookie_name.clone(),
            self.config.access_cookie_opts.clone(),
        ));
        ctx.resp_cookies.push(SetCookie::removal(
            self.config.refresh_cookie_name.clone(),
            self.config.refresh_cookie_opts.clone(),
        ));
        Ok(())
    }

    async fn create(&self, ctx: &mut RequestContext, opts: UpsertOpts) -> Result<(), Error> {
        let user_id = ctx.user_id.clone().ok_or(Error::MissingUserId)?;

        let now = unix_now();
        let expires_at = match self.config.session_ttl {
            Some(ttl) => Expiry::At(now + ttl),
            None => Expiry::Never,
        };
        let session = Session {
            id: SessionId::from(Ulid::new().to_string()),
            user_id,
            session_type: opts.session_type,
            transport: opts.transport,
            created_at: now,
            refreshed_at: now,
            expires_at,
            refresh_expires_at: expires_at.min_with(now + self.config.refresh_token_ttl),
            refresh_token_id: TokenId::from(Ulid::new().to_string()),
            tokens_fresh_from: now,
            prev_tokens_fresh_from: 0,
            lock_version: 0,
            extra_payload: opts.extra_payload,
        };

        match self.store.upsert_dyn(&session).await? {
            Upsert::Stored => {}
            // A fresh ULID colliding with a locked entry means the
            // backend is corrupt, not that we raced anyone.
            Upsert::Conflict => {
                return Err(Error::Store(crate::error::StoreError::backend(
                    "lock conflict storing a fresh session",
                )));
            }
        }

        let minted = self.mint(&session, now).await?;
        tracing::info!(session_id = %session.id, user_id = %session.user_id, "session created");
        attach(ctx, session, minted);
        Ok(())
    }

    async fn refresh(
        &self,
        ctx: &mut RequestContext,
        mut session: Session,
        opts: UpsertOpts,
    ) -> Result<(), Error> {
        let now = unix_now();
        // A token without iat cannot prove which generation it belongs
        // to; it sorts before any window.
        let presented_iat = ctx
            .bearer_token_payload
            .as_ref()
            .and_then(|p| p.get(claims::IAT))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        if presented_iat >= session.tokens_fresh_from {
            // Current generation: slide the window.
            session.prev_tokens_fresh_from = session.tokens_fresh_from;
            session.tokens_fresh_from = now;
            session.refreshed_at = now;
            session.refresh_token_id = TokenId::from(Ulid::new().to_string());
            session.refresh_expires_at = session
                .expires_at
                .min_with(now + self.config.refresh_token_ttl);
            session.lock_version += 1;
            session.extra_payload.extend(opts.extra_payload);

            match self.store.upsert_dyn(&session).await? {
                Upsert::Stored => {
                    let minted = self.mint(&session, now).await?;
                    tracing::info!(session_id = %session.id, "session refreshed");
                    attach(ctx, session, minted);
                }
                Upsert::Conflict => {
                    // Lost the race: a concurrent refresh already
                    // advanced the generation. Serve tokens for whatever
                    // the winner stored, exactly like a previous-
                    // generation refresh.
                    tracing::warn!(
                        session_id = %session.id,
                        "rotation conflict, serving current generation"
                    );
                    match self
                        .store
                        .get_dyn(&session.id, &session.user_id, &session.session_type)
                        .await?
                    {
                        Some(current) => {
                            let minted = self.mint(&current, now).await?;
                            attach(ctx, current, minted);
                        }
                        None => ctx.halt(AuthError::SessionNotFound),
                    }
                }
            }
        } else if presented_iat >= session.prev_tokens_fresh_from {
            // Grace window: mint against the current generation, write
            // nothing, so the same token can be retried any number of
            // times until the window slides again.
            tracing::debug!(session_id = %session.id, "grace-window refresh");
            let minted = self.mint(&session, now).await?;
            attach(ctx, session, minted);
        } else {
            ctx.halt(AuthError::TokenStale);
        }
        Ok(())
    }

    /// Mint an access/refresh pair for the session's current generation.
    async fn mint(&self, session: &Session, now: i64) -> Result<(Tokens, Vec<SetCookie>), Error> {
        let access_exp = (now + self.config.access_token_ttl).min(session.refresh_expires_at);
        let refresh_exp = session.refresh_expires_at;

        let mut base = Map::new();
        base.insert(claims::ISS.into(), json!(self.config.token_issuer));
        base.insert(claims::SUB.into(), json!(session.user_id.0));
        base.insert(claims::SID.into(), json!(session.id.0));
        base.insert(claims::STYP.into(), json!(session.session_type.0));
        base.insert(claims::JTI.into(), json!(session.refresh_token_id.0));
        base.insert(claims::IAT.into(), json!(now));
        base.insert(claims::NBF.into(), json!(now));

        // Extra payload goes first so it can never shadow a reserved claim.
        let mut access = session.extra_payload.clone();
        access.extend(base.clone());
        access.insert(claims::TYPE.into(), json!(TokenKind::Access.as_str()));
        access.insert(claims::EXP.into(), json!(access_exp));

        let mut refresh = base;
        refresh.insert(claims::TYPE.into(), json!(TokenKind::Refresh.as_str()));
        refresh.insert(claims::EXP.into(), json!(refresh_exp));

        let access_token = self.factory.sign_dyn(&access).await?;
        let refresh_token = self.factory.sign_dyn(&refresh).await?;

        let mut cookies = Vec::new();
        let (access_token, refresh_token) = match session.transport {
            TransportMode::Bearer => (access_token, refresh_token),
            TransportMode::Cookie => {
                let (access_head, access_sig) =
                    transport::split(&access_token).ok_or(TokenError::Malformed)?;
                let (refresh_head, refresh_sig) =
                    transport::split(&refresh_token).ok_or(TokenError::Malformed)?;
                cookies.push(SetCookie {
                    name: self.config.access_cookie_name.clone(),
                    value: access_sig.to_owned(),
                    max_age: access_exp - now,
                    opts: self.config.access_cookie_opts.clone(),
                });
                cookies.push(SetCookie {
                    name: self.config.refresh_cookie_name.clone(),
                    value: refresh_sig.to_owned(),
                    max_age: refresh_exp - now,
                    opts: self.config.refresh_cookie_opts.clone(),
                });
                (access_head.to_owned(), refresh_head.to_owned())
            }
        };

        Ok((
            Tokens {
                access_token,
                refresh_token,
                access_token_exp: access_exp,
                refresh_token_exp: refresh_exp,
            },
            cookies,
        ))
    }
}

fn attach(ctx: &mut RequestContext, session: Session, (tokens, cookies): (Tokens, Vec<SetCookie>)) {
    ctx.user_id = Some(session.user_id.clone());
    ctx.token_signature_transport = Some(session.transport);
    ctx.resp_cookies.extend(cookies);
    ctx.tokens = Some(tokens);
    ctx.session = Some(session);
}
