use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use serde_json::{Map, Value};

use super::error::AuthRejection;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::pipeline::TokenPipeline;
use crate::session::Session;
use crate::types::UserId;

/// Authenticated user extracted from a bearer access token.
///
/// Use as an Axum extractor in route handlers; requires
/// `FromRef<S> for TokenPipeline` on your app state. Returns
/// `401 Unauthorized` with the stable auth-error string when the token
/// or session does not hold up.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(user: Authenticated) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<Authenticated>) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}", u.user_id),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user_id: UserId,
    pub session: Session,
    /// Verified bearer token claims, `extra_payload` included.
    pub token_payload: Map<String, Value>,
}

impl<S> FromRequestParts<S> for Authenticated
where
    TokenPipeline: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pipeline = TokenPipeline::from_ref(state);

        let mut ctx = context_from_parts(parts);
        pipeline.validate(&mut ctx).await?;

        if let Some(error) = ctx.auth_error {
            return Err(AuthRejection::Auth(error));
        }
        match (ctx.user_id, ctx.session, ctx.bearer_token_payload) {
            (Some(user_id), Some(session), Some(token_payload)) => Ok(Self {
                user_id,
                session,
                token_payload,
            }),
            _ => Err(AuthRejection::Auth(AuthError::TokenNotFound)),
        }
    }
}

/// Build a [`RequestContext`] from request parts: `Authorization`
/// header plus request cookies.
#[must_use]
pub fn context_from_parts(parts: &Parts) -> RequestContext {
    let mut ctx = RequestContext::new();
    ctx.authorization = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    for cookie in CookieJar::from_headers(&parts.headers).iter() {
        ctx.req_cookies
            .insert(cookie.name().to_owned(), cookie.value().to_owned());
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_from_parts_picks_up_header_and_cookies() {
        let request = axum::http::Request::builder()
            .header(AUTHORIZATION, "Bearer a.b")
            .header("cookie", "_refresh_token_signature=sig; other=1")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();

        let ctx = context_from_parts(&parts);
        assert_eq!(ctx.authorization.as_deref(), Some("Bearer a.b"));
        assert_eq!(
            ctx.req_cookies.get("_refresh_token_signature").map(String::as_str),
            Some("sig")
        );
        assert_eq!(ctx.req_cookies.get("other").map(String::as_str), Some("1"));
    }

    #[test]
    fn context_from_parts_tolerates_bare_requests() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let (parts, ()) = request.into_parts();

        let ctx = context_from_parts(&parts);
        assert!(ctx.authorization.is_none());
        assert!(ctx.req_cookies.is_empty());
    }
}
