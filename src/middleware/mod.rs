//! Plug-and-play bearer authentication middleware for Axum.
//!
//! This module adapts the framework-neutral [`RequestContext`](crate::RequestContext)
//! plumbing to Axum: an extractor that runs the access-token pipeline,
//! and a helper to apply engine-emitted cookies to a response jar.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use charon::middleware::{Authenticated, apply_cookies};
//! use charon::{RequestContext, SessionEngine, TokenKind, UpsertOpts};
//!
//! // 1. Keep a SessionEngine (and its pipelines) in your app state,
//! //    with `FromRef<AppState> for TokenPipeline` implemented.
//!
//! // 2. Use the extractor in protected handlers
//! async fn me(user: Authenticated) -> String {
//!     format!("Hello, {}", user.user_id)
//! }
//!
//! // 3. In the login handler, create a session and apply its cookies
//! async fn login(jar: CookieJar, /* ... */) -> impl IntoResponse {
//!     let mut ctx = RequestContext::for_user(user_id);
//!     engine.upsert_session(&mut ctx, UpsertOpts::default()).await?;
//!     let jar = apply_cookies(jar, &ctx.resp_cookies);
//!     (jar, Json(ctx.tokens))
//! }
//! ```

mod cookies;
mod error;
mod extractor;

pub use cookies::apply_cookies;
pub use error::AuthRejection;
pub use extractor::{Authenticated, context_from_parts};
