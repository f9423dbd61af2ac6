//! Signature transport: how a three-segment token travels.
//!
//! In `bearer` mode the whole token rides in the `Authorization` header.
//! In `cookie` mode the header carries only `header.payload` and the
//! signature segment is set as an HTTP-only cookie, so scripts that can
//! read the header half still cannot produce a full token.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSitePolicy {
    #[default]
    Strict,
    Lax,
    None,
}

/// Attributes applied to signature cookies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieOpts {
    pub http_only: bool,
    pub same_site: SameSitePolicy,
    pub secure: bool,
    pub path: String,
}

impl Default for CookieOpts {
    fn default() -> Self {
        Self {
            http_only: true,
            same_site: SameSitePolicy::Strict,
            secure: true,
            path: "/".to_owned(),
        }
    }
}

/// A cookie the host must set on the response.
///
/// Framework-neutral: the Axum adapter converts these to real
/// `Set-Cookie` headers. `max_age == 0` means removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    /// Lifetime in seconds; 0 removes the cookie.
    pub max_age: i64,
    pub opts: CookieOpts,
}

impl SetCookie {
    #[must_use]
    pub fn removal(name: impl Into<String>, opts: CookieOpts) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            max_age: 0,
            opts,
        }
    }
}

/// Split a full token into its `header.payload` half and its signature.
///
/// Returns `None` unless the token has exactly three segments.
#[must_use]
pub fn split(token: &str) -> Option<(&str, &str)> {
    let (head, signature) = token.rsplit_once('.')?;
    if head.matches('.').count() != 1 || signature.is_empty() {
        return None;
    }
    Some((head, signature))
}

/// Rebuild a full token from the `Authorization` value and, when the
/// header half arrived without its signature, the matching cookie.
///
/// Self-describing: three segments are complete (bearer transport), two
/// segments need the signature cookie.
///
/// # Errors
///
/// [`AuthError::SignatureCookieNotFound`] in cookie mode without the
/// cookie; [`AuthError::TokenInvalid`] for any other segment count.
pub(crate) fn reassemble(token: &str, signature_cookie: Option<&str>) -> Result<String, AuthError> {
    match token.matches('.').count() {
        2 => Ok(token.to_owned()),
        1 => signature_cookie
            .map(|sig| format!("{token}.{sig}"))
            .ok_or(AuthError::SignatureCookieNotFound),
        _ => Err(AuthError::TokenInvalid),
    }
}
