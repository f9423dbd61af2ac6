//! Token factory: signing and verification of bearer tokens.
//!
//! Tokens are HS256 JWTs: three base64url segments joined by `.`, the
//! signature being `HMAC_SHA256(header_b64 || "." || payload_b64, key)`.
//! Verification checks signature and structural form only; temporal and
//! semantic claim validation belongs to the pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde_json::{Map, Value};

use crate::error::TokenError;
use crate::keys::Keyring;

/// Claim names used in Charon tokens.
pub mod claims {
    pub const ISS: &str = "iss";
    pub const SUB: &str = "sub";
    pub const SID: &str = "sid";
    pub const JTI: &str = "jti";
    pub const TYPE: &str = "type";
    pub const STYP: &str = "styp";
    pub const IAT: &str = "iat";
    pub const NBF: &str = "nbf";
    pub const EXP: &str = "exp";
}

/// Signs and verifies opaque bearer tokens carrying a JSON claim payload.
///
/// Implementations must be side-effect free. Keys come from a
/// [`Keyring`] getter so deployments can rotate them without
/// recompilation.
pub trait TokenFactory: Send + Sync + 'static {
    /// Sign a claim payload into an opaque token string.
    fn sign(
        &self,
        claims: &Map<String, Value>,
    ) -> impl Future<Output = Result<String, TokenError>> + Send;

    /// Validate signature and structural form; return the claim payload.
    ///
    /// Does NOT validate claim semantics (`exp`, `nbf`, issuer, ...).
    fn verify(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Map<String, Value>, TokenError>> + Send;
}

/// Object-safe wrapper for [`TokenFactory`] (needed for `Arc<dyn>`).
pub(crate) trait TokenFactoryDyn: Send + Sync {
    fn sign_dyn<'a>(
        &'a self,
        claims: &'a Map<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<String, TokenError>> + Send + 'a>>;

    fn verify_dyn<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Map<String, Value>, TokenError>> + Send + 'a>>;
}

impl<T: TokenFactory> TokenFactoryDyn for T {
    fn sign_dyn<'a>(
        &'a self,
        claims: &'a Map<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<String, TokenError>> + Send + 'a>> {
        Box::pin(self.sign(claims))
    }

    fn verify_dyn<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Map<String, Value>, TokenError>> + Send + 'a>> {
        Box::pin(self.verify(token))
    }
}

/// HS256 JWT factory.
///
/// The signing key id travels in the JWT `kid` header so verification
/// keeps working across key rotations for as long as the [`Keyring`]
/// still answers for retired kids.
#[derive(Clone)]
pub struct Hs256TokenFactory {
    keyring: Arc<dyn Keyring>,
}

impl Hs256TokenFactory {
    #[must_use]
    pub fn new(keyring: Arc<dyn Keyring>) -> Self {
        Self { keyring }
    }

    fn sign_sync(&self, claims: &Map<String, Value>) -> Result<String, TokenError> {
        let kid = self.keyring.current_kid().to_owned();
        let key = self
            .keyring
            .get(&kid)
            .ok_or_else(|| TokenError::UnknownKey(kid.clone()))?;

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid);

        encode(
            &header,
            &Value::Object(claims.clone()),
            &EncodingKey::from_secret(key.expose()),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify_sync(&self, token: &str) -> Result<Map<String, Value>, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        // Tokens minted before kid headers were introduced fall back to
        // the current key.
        let kid = header
            .kid
            .unwrap_or_else(|| self.keyring.current_kid().to_owned());
        let key = self
            .keyring
            .get(&kid)
            .ok_or(TokenError::UnknownKey(kid))?;

        // Structural + signature checks only; the pipeline owns claim
        // semantics and produces its own error strings for them.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Map<String, Value>>(
            token,
            &DecodingKey::from_secret(key.expose()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed,
        })?;

        Ok(data.claims)
    }
}

impl TokenFactory for Hs256TokenFactory {
    async fn sign(&self, claims: &Map<String, Value>) -> Result<String, TokenError> {
        self.sign_sync(claims)
    }

    async fn verify(&self, token: &str) -> Result<Map<String, Value>, TokenError> {
        self.verify_sync(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeyring;

    fn factory(kid: &str, secret: [u8; 32]) -> Hs256TokenFactory {
        let ring = StaticKeyring::new(kid, secret, [9u8; 32]).unwrap();
        Hs256TokenFactory::new(Arc::new(ring))
    }

    fn sample_claims() -> Map<String, Value> {
        serde_json::json!({
            "iss": "test", "sub": "42", "sid": "s-1", "jti": "r-1",
            "type": "refresh", "styp": "full",
            "iat": 1000, "nbf": 1000, "exp": 2000,
            "custom": {"plan": "pro"},
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[tokio::test]
    async fn sign_verify_roundtrip_preserves_claims() {
        let factory = factory("k1", [1u8; 32]);
        let token = factory.sign(&sample_claims()).await.unwrap();

        assert_eq!(token.split('.').count(), 3);

        let payload = factory.verify(&token).await.unwrap();
        assert_eq!(payload.get("sub").unwrap(), "42");
        assert_eq!(payload.get("type").unwrap(), "refresh");
        assert_eq!(payload.get("custom").unwrap()["plan"], "pro");
    }

    #[tokio::test]
    async fn verify_is_structural_only() {
        // An exp far in the past must still verify; expiry is the
        // pipeline's call.
        let factory = factory("k1", [1u8; 32]);
        let mut claims = sample_claims();
        claims.insert("exp".into(), serde_json::json!(1));

        let token = factory.sign(&claims).await.unwrap();
        assert!(factory.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn different_secret_fails_with_bad_signature() {
        let signer = factory("k1", [1u8; 32]);
        let other = factory("k1", [2u8; 32]);

        let token = signer.sign(&sample_claims()).await.unwrap();
        assert!(matches!(
            other.verify(&token).await,
            Err(TokenError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected() {
        let signer = factory("k1", [1u8; 32]);
        let other = factory("k2", [1u8; 32]);

        let token = signer.sign(&sample_claims()).await.unwrap();
        assert!(matches!(
            other.verify(&token).await,
            Err(TokenError::UnknownKey(kid)) if kid == "k1"
        ));
    }

    #[tokio::test]
    async fn retired_key_still_verifies() {
        let old = factory("k1", [1u8; 32]);
        let token = old.sign(&sample_claims()).await.unwrap();

        let ring = StaticKeyring::new("k2", [2u8; 32], [9u8; 32])
            .unwrap()
            .with_retired_key("k1", [1u8; 32])
            .unwrap();
        let rotated = Hs256TokenFactory::new(Arc::new(ring));

        assert!(rotated.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let factory = factory("k1", [1u8; 32]);
        assert!(matches!(
            factory.verify("not-a-token").await,
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            factory.verify("a.b.c").await,
            Err(TokenError::Malformed)
        ));
    }
}
