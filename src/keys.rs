//! Key material and the rotation-friendly getter contract.
//!
//! Tokens and at-rest session blobs are both HMAC-signed. The engine never
//! holds raw keys; it asks a [`Keyring`] every time, so deployments can
//! rotate keys without recompiling or restarting.

use std::collections::HashMap;

use crate::error::Error;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// An HMAC secret. `Debug` is redacted.
#[derive(Clone)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the secret is shorter than
    /// [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LENGTH {
            return Err(Error::Config(format!(
                "secret must be at least {MIN_SECRET_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBytes(..)")
    }
}

/// Key getter consulted on every sign/verify.
///
/// Implementations may serve keys from memory, a file watcher, or a KMS.
/// `get` must keep answering for retired signing keys for as long as
/// tokens signed with them can still be in flight.
pub trait Keyring: Send + Sync + 'static {
    /// Id of the key new tokens are signed with (the JWT `kid` header).
    fn current_kid(&self) -> &str;

    /// Resolve a key by id. `None` means unknown or revoked.
    fn get(&self, kid: &str) -> Option<&SecretBytes>;

    /// Key for at-rest session blob HMACs.
    fn store_key(&self) -> &SecretBytes;
}

/// Fixed in-memory keyring.
#[derive(Debug, Clone)]
pub struct StaticKeyring {
    current_kid: String,
    keys: HashMap<String, SecretBytes>,
    store_key: SecretBytes,
}

impl StaticKeyring {
    /// Create a keyring with one signing key and a separate store key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either secret is too short.
    pub fn new(
        kid: impl Into<String>,
        signing_key: impl Into<Vec<u8>>,
        store_key: impl Into<Vec<u8>>,
    ) -> Result<Self, Error> {
        let kid = kid.into();
        let mut keys = HashMap::new();
        keys.insert(kid.clone(), SecretBytes::new(signing_key)?);
        Ok(Self {
            current_kid: kid,
            keys,
            store_key: SecretBytes::new(store_key)?,
        })
    }

    /// Add a retired signing key that verification should still accept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the secret is too short.
    pub fn with_retired_key(
        mut self,
        kid: impl Into<String>,
        secret: impl Into<Vec<u8>>,
    ) -> Result<Self, Error> {
        self.keys.insert(kid.into(), SecretBytes::new(secret)?);
        Ok(self)
    }
}

impl Keyring for StaticKeyring {
    fn current_kid(&self) -> &str {
        &self.current_kid
    }

    fn get(&self, kid: &str) -> Option<&SecretBytes> {
        self.keys.get(kid)
    }

    fn store_key(&self) -> &SecretBytes {
        &self.store_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_secret() {
        assert!(SecretBytes::new(b"too-short".to_vec()).is_err());
        assert!(SecretBytes::new([0u8; MIN_SECRET_LENGTH]).is_ok());
    }

    #[test]
    fn debug_is_redacted() {
        let secret = SecretBytes::new([7u8; 32]).unwrap();
        assert_eq!(format!("{secret:?}"), "SecretBytes(..)");
    }

    #[test]
    fn static_keyring_resolves_retired_keys() {
        let ring = StaticKeyring::new("k2", [1u8; 32], [2u8; 32])
            .unwrap()
            .with_retired_key("k1", [3u8; 32])
            .unwrap();

        assert_eq!(ring.current_kid(), "k2");
        assert!(ring.get("k1").is_some());
        assert!(ring.get("k2").is_some());
        assert!(ring.get("k0").is_none());
    }
}
