use crate::error::Error;
use crate::transport::CookieOpts;

/// Default access token lifetime in seconds (15 minutes).
const DEFAULT_ACCESS_TOKEN_TTL: i64 = 900;
/// Default refresh token lifetime in seconds (60 days).
const DEFAULT_REFRESH_TOKEN_TTL: i64 = 5_184_000;
/// Default absolute session lifetime in seconds (365 days).
const DEFAULT_SESSION_TTL: i64 = 31_536_000;
const DEFAULT_ACCESS_COOKIE_NAME: &str = "_access_token_signature";
const DEFAULT_REFRESH_COOKIE_NAME: &str = "_refresh_token_signature";
const DEFAULT_KEY_PREFIX: &str = "charon";

/// Library configuration.
///
/// Use [`from_env()`](Config::from_env) for convention-based setup, or
/// [`builder()`](Config::builder) for full control.
#[derive(Debug, Clone)]
pub struct Config {
    /// Value placed in the `iss` claim of every token.
    pub token_issuer: String,
    /// Access token lifetime in seconds.
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds; bounds each refresh window.
    pub refresh_token_ttl: i64,
    /// Absolute session lifetime in seconds. `None` means sessions only
    /// end when their refresh window lapses.
    pub session_ttl: Option<i64>,
    /// Access-token signature cookie name (cookie transport).
    pub access_cookie_name: String,
    /// Refresh-token signature cookie name (cookie transport).
    pub refresh_cookie_name: String,
    pub access_cookie_opts: CookieOpts,
    pub refresh_cookie_opts: CookieOpts,
    /// Prefix for all session storage keys.
    pub key_prefix: String,
}

impl Config {
    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `CHARON_TOKEN_ISSUER`: value for the `iss` claim
    ///
    /// # Optional env vars
    /// - `CHARON_ACCESS_TOKEN_TTL` (seconds, default 900)
    /// - `CHARON_REFRESH_TOKEN_TTL` (seconds, default 5184000)
    /// - `CHARON_SESSION_TTL` (seconds, default 31536000; `infinite` for
    ///   sessions without an absolute end)
    /// - `CHARON_KEY_PREFIX` (default `charon`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required var is missing or a value
    /// does not parse. Configuration errors are fatal; refuse to start.
    pub fn from_env() -> Result<Self, Error> {
        let token_issuer = std::env::var("CHARON_TOKEN_ISSUER")
            .map_err(|_| Error::Config("CHARON_TOKEN_ISSUER is required".into()))?;

        let mut builder = Self::builder().token_issuer(token_issuer);

        if let Ok(ttl) = std::env::var("CHARON_ACCESS_TOKEN_TTL") {
            builder = builder.access_token_ttl(parse_secs("CHARON_ACCESS_TOKEN_TTL", &ttl)?);
        }
        if let Ok(ttl) = std::env::var("CHARON_REFRESH_TOKEN_TTL") {
            builder = builder.refresh_token_ttl(parse_secs("CHARON_REFRESH_TOKEN_TTL", &ttl)?);
        }
        if let Ok(ttl) = std::env::var("CHARON_SESSION_TTL") {
            builder = if ttl == "infinite" {
                builder.infinite_sessions()
            } else {
                builder.session_ttl(parse_secs("CHARON_SESSION_TTL", &ttl)?)
            };
        }
        if let Ok(prefix) = std::env::var("CHARON_KEY_PREFIX") {
            builder = builder.key_prefix(prefix);
        }

        builder.build()
    }

    /// Create a builder for full control over configuration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

fn parse_secs(var: &str, value: &str) -> Result<i64, Error> {
    value
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| Error::Config(format!("{var} must be a positive number of seconds")))
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    token_issuer: Option<String>,
    access_token_ttl: Option<i64>,
    refresh_token_ttl: Option<i64>,
    session_ttl: Option<i64>,
    infinite_sessions: bool,
    access_cookie_name: Option<String>,
    refresh_cookie_name: Option<String>,
    access_cookie_opts: Option<CookieOpts>,
    refresh_cookie_opts: Option<CookieOpts>,
    key_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Set the `iss` claim value. Required.
    #[must_use]
    pub fn token_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.token_issuer = Some(issuer.into());
        self
    }

    /// Set the access token lifetime in seconds (default: 900).
    #[must_use]
    pub fn access_token_ttl(mut self, seconds: i64) -> Self {
        self.access_token_ttl = Some(seconds);
        self
    }

    /// Set the refresh token lifetime in seconds (default: 60 days).
    #[must_use]
    pub fn refresh_token_ttl(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl = Some(seconds);
        self
    }

    /// Set the absolute session lifetime in seconds (default: 365 days).
    #[must_use]
    pub fn session_ttl(mut self, seconds: i64) -> Self {
        self.session_ttl = Some(seconds);
        self.infinite_sessions = false;
        self
    }

    /// Sessions never expire absolutely; only refresh windows end them.
    #[must_use]
    pub fn infinite_sessions(mut self) -> Self {
        self.session_ttl = None;
        self.infinite_sessions = true;
        self
    }

    /// Set the access signature cookie name
    /// (default: `"_access_token_signature"`).
    #[must_use]
    pub fn access_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.access_cookie_name = Some(name.into());
        self
    }

    /// Set the refresh signature cookie name
    /// (default: `"_refresh_token_signature"`).
    #[must_use]
    pub fn refresh_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.refresh_cookie_name = Some(name.into());
        self
    }

    /// Override access signature cookie attributes.
    #[must_use]
    pub fn access_cookie_opts(mut self, opts: CookieOpts) -> Self {
        self.access_cookie_opts = Some(opts);
        self
    }

    /// Override refresh signature cookie attributes.
    #[must_use]
    pub fn refresh_cookie_opts(mut self, opts: CookieOpts) -> Self {
        self.refresh_cookie_opts = Some(opts);
        self
    }

    /// Set the storage key prefix (default: `"charon"`).
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `token_issuer` is not set.
    pub fn build(self) -> Result<Config, Error> {
        Ok(Config {
            token_issuer: self
                .token_issuer
                .ok_or_else(|| Error::Config("token_issuer is required".into()))?,
            access_token_ttl: self.access_token_ttl.unwrap_or(DEFAULT_ACCESS_TOKEN_TTL),
            refresh_token_ttl: self.refresh_token_ttl.unwrap_or(DEFAULT_REFRESH_TOKEN_TTL),
            session_ttl: if self.infinite_sessions {
                None
            } else {
                Some(self.session_ttl.unwrap_or(DEFAULT_SESSION_TTL))
            },
            access_cookie_name: self
                .access_cookie_name
                .unwrap_or_else(|| DEFAULT_ACCESS_COOKIE_NAME.into()),
            refresh_cookie_name: self
                .refresh_cookie_name
                .unwrap_or_else(|| DEFAULT_REFRESH_COOKIE_NAME.into()),
            access_cookie_opts: self.access_cookie_opts.unwrap_or_default(),
            refresh_cookie_opts: self.refresh_cookie_opts.unwrap_or_default(),
            key_prefix: self.key_prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SameSitePolicy;

    #[test]
    fn builder_applies_defaults() {
        let config = Config::builder().token_issuer("my-api").build().unwrap();

        assert_eq!(config.token_issuer, "my-api");
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.refresh_token_ttl, 5_184_000);
        assert_eq!(config.session_ttl, Some(31_536_000));
        assert_eq!(config.access_cookie_name, "_access_token_signature");
        assert_eq!(config.refresh_cookie_name, "_refresh_token_signature");
        assert_eq!(config.key_prefix, "charon");
        assert!(config.access_cookie_opts.http_only);
        assert_eq!(config.access_cookie_opts.same_site, SameSitePolicy::Strict);
        assert!(config.access_cookie_opts.secure);
    }

    #[test]
    fn builder_requires_issuer() {
        assert!(matches!(
            Config::builder().build(),
            Err(Error::Config(msg)) if msg.contains("token_issuer")
        ));
    }

    #[test]
    fn infinite_sessions_clear_session_ttl() {
        let config = Config::builder()
            .token_issuer("my-api")
            .infinite_sessions()
            .build()
            .unwrap();
        assert_eq!(config.session_ttl, None);
    }

    #[test]
    fn parse_secs_rejects_non_positive() {
        assert!(parse_secs("X", "0").is_err());
        assert!(parse_secs("X", "-5").is_err());
        assert!(parse_secs("X", "abc").is_err());
        assert_eq!(parse_secs("X", "900").unwrap(), 900);
    }
}
