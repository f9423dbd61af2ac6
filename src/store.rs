//! Session store contract and the shared storage key shapes.

use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;
use crate::session::Session;
use crate::types::{SessionId, SessionType, UserId};

/// Outcome of an optimistic-locking upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The write landed (or was a no-op for an already-expired session).
    Stored,
    /// Another writer advanced the lock version first; nothing was
    /// written. The caller should re-read and decide.
    Conflict,
}

/// Persistence for sessions keyed by `(user_id, session_type, id)`.
///
/// Implementations must provide the §concurrency guarantees the engine
/// leans on: the upsert's lock check and writes happen atomically, and
/// readers never observe a torn mixture of old and new state.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for MyRedisStore {
///     async fn get(
///         &self,
///         id: &SessionId,
///         user_id: &UserId,
///         session_type: &SessionType,
///     ) -> Result<Option<Session>, StoreError> {
///         let blob = self.conn.hget(keys::session_map(&self.prefix, user_id, session_type), id).await?;
///         Ok(blob.and_then(|b| self.open(&b, user_id, session_type)))
///     }
///     // ...
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Look up a session. `None` for missing, expired, integrity-failed,
    /// or mismatched (`user_id`, `session_type`) records alike.
    fn get(
        &self,
        id: &SessionId,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Insert or update a session under the optimistic-lock protocol:
    /// the write is accepted only if the stored lock version equals
    /// `session.lock_version - 1` (or no lock exists yet).
    fn upsert(&self, session: &Session) -> impl Future<Output = Result<Upsert, StoreError>> + Send;

    /// Remove one session from all bookkeeping collections.
    fn delete(
        &self,
        id: &SessionId,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All live sessions for `(user_id, session_type)`.
    fn get_all(
        &self,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> impl Future<Output = Result<Vec<Session>, StoreError>> + Send;

    /// Drop every session and all bookkeeping for `(user_id, session_type)`.
    fn delete_all(
        &self,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Object-safe wrapper for [`SessionStore`] (needed for `Arc<dyn>`).
pub(crate) trait SessionStoreDyn: Send + Sync {
    fn get_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Session>, StoreError>> + Send + 'a>>;

    fn upsert_dyn<'a>(
        &'a self,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<Upsert, StoreError>> + Send + 'a>>;

    fn delete_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn get_all_dyn<'a>(
        &'a self,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Session>, StoreError>> + Send + 'a>>;

    fn delete_all_dyn<'a>(
        &'a self,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;
}

impl<T: SessionStore> SessionStoreDyn for T {
    fn get_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Session>, StoreError>> + Send + 'a>> {
        Box::pin(self.get(id, user_id, session_type))
    }

    fn upsert_dyn<'a>(
        &'a self,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<Upsert, StoreError>> + Send + 'a>> {
        Box::pin(self.upsert(session))
    }

    fn delete_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.delete(id, user_id, session_type))
    }

    fn get_all_dyn<'a>(
        &'a self,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Session>, StoreError>> + Send + 'a>> {
        Box::pin(self.get_all(user_id, session_type))
    }

    fn delete_all_dyn<'a>(
        &'a self,
        user_id: &'a UserId,
        session_type: &'a SessionType,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.delete_all(user_id, session_type))
    }
}

/// Storage key shapes shared by every backend.
///
/// Per `(user_id, session_type)` there are four collections: the session
/// map, the expiration ordered set, the lock map, and the prune-lock
/// marker. Backends must use exactly these shapes so workers sharing a
/// backend agree on the layout.
pub mod keys {
    use crate::types::{SessionType, UserId};

    /// Session map: `sid -> signed serialized session`.
    #[must_use]
    pub fn session_map(prefix: &str, user_id: &UserId, session_type: &SessionType) -> String {
        format!("{prefix}.s.{user_id}.{session_type}")
    }

    /// Expiration ordered set: `sid -> refresh_expires_at`.
    #[must_use]
    pub fn expiration_set(prefix: &str, user_id: &UserId, session_type: &SessionType) -> String {
        format!("{prefix}.e.{user_id}.{session_type}")
    }

    /// Lock map: `sid -> lock_version`.
    #[must_use]
    pub fn lock_map(prefix: &str, user_id: &UserId, session_type: &SessionType) -> String {
        format!("{prefix}.l.{user_id}.{session_type}")
    }

    /// Prune-lock marker (cooldown gate).
    #[must_use]
    pub fn prune_lock(prefix: &str, user_id: &UserId, session_type: &SessionType) -> String {
        format!("{prefix}.pl.{user_id}.{session_type}")
    }
}
