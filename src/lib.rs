#![doc = include_str!("../README.md")]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod keys;
pub mod memory_store;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod token;
pub mod transport;
pub mod types;

#[cfg(feature = "axum")]
pub mod middleware;

// Re-exports for convenient access
pub use config::{Config, ConfigBuilder};
pub use context::RequestContext;
pub use engine::{SessionEngine, UpsertOpts};
pub use error::{AuthError, Error, StoreError, TokenError};
pub use keys::{Keyring, MIN_SECRET_LENGTH, SecretBytes, StaticKeyring};
pub use memory_store::{MemoryStore, Prune};
pub use pipeline::TokenPipeline;
pub use session::{Expiry, Session, Tokens};
pub use store::{SessionStore, Upsert};
pub use token::{Hs256TokenFactory, TokenFactory};
pub use transport::{CookieOpts, SameSitePolicy, SetCookie};
pub use types::{SessionId, SessionType, TokenId, TokenKind, TransportMode, UserId};
