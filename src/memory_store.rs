//! In-process [`SessionStore`] implementing the full shared-KV layout.
//!
//! The backing state is a single keyspace: string keys in the shapes of
//! [`store::keys`](crate::store::keys), each holding one collection with
//! an absolute expiry. All four collections for a `(user_id,
//! session_type)` pair share their expiry, pinned to the maximum
//! `refresh_expires_at` among the live sessions, so the whole
//! per-user bookkeeping lapses together once the last session does.
//!
//! One mutex guards the keyspace, which directly gives the atomicity the
//! upsert protocol asks from scripted KV backends.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;

use crate::error::StoreError;
use crate::keys::Keyring;
use crate::session::{Session, unix_now};
use crate::store::{SessionStore, Upsert, keys};
use crate::types::{SessionId, SessionType, UserId};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 tag length prefixed to every stored session blob.
const TAG_LEN: usize = 32;
/// Minimum interval between prune passes per `(user_id, session_type)`.
const PRUNE_COOLDOWN_SECS: i64 = 3600;

/// Outcome of a prune attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prune {
    /// The prune ran; this many dead members were removed.
    Pruned(usize),
    /// The cooldown is active; nothing was touched.
    Skipped,
}

enum Entry {
    /// Session map: `sid -> HMAC-prefixed serialized session`.
    Blobs(HashMap<String, Vec<u8>>),
    /// Expiration ordered set: `sid -> refresh_expires_at`.
    Scores(HashMap<String, i64>),
    /// Lock map: `sid -> lock_version`.
    Versions(HashMap<String, u64>),
    /// Prune-lock marker.
    Flag,
}

struct Keyed {
    entry: Entry,
    /// Absolute expiry of the whole collection (epoch seconds).
    expires_at: i64,
}

/// In-memory session store.
pub struct MemoryStore {
    keyring: Arc<dyn Keyring>,
    prefix: String,
    keyspace: Mutex<HashMap<String, Keyed>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(keyring: Arc<dyn Keyring>, key_prefix: impl Into<String>) -> Self {
        Self {
            keyring,
            prefix: key_prefix.into(),
            keyspace: Mutex::new(HashMap::new()),
        }
    }

    /// Remove members whose refresh window has passed from the three
    /// bookkeeping collections.
    ///
    /// Best-effort and shared-cooldown-gated: returns
    /// [`Prune::Skipped`] without touching anything while the prune lock
    /// is live. Invoked opportunistically on every upsert.
    pub fn prune(&self, user_id: &UserId, session_type: &SessionType) -> Prune {
        let now = unix_now();
        let mut ks = self.keyspace.lock();
        prune_collections(&mut ks, &self.prefix, user_id, session_type, now)
    }

    /// Serialize and HMAC-prefix a session for storage.
    fn seal(&self, session: &Session) -> Result<Vec<u8>, StoreError> {
        let body = serde_json::to_vec(session).map_err(StoreError::backend)?;
        let mut mac = HmacSha256::new_from_slice(self.keyring.store_key().expose())
            .map_err(StoreError::backend)?;
        mac.update(&body);
        let mut blob = mac.finalize().into_bytes().to_vec();
        blob.extend_from_slice(&body);
        Ok(blob)
    }

    /// Verify and deserialize a stored blob. Integrity failures read as
    /// absent.
    fn open(&self, blob: &[u8]) -> Option<Session> {
        if blob.len() <= TAG_LEN {
            tracing::warn!("session blob too short, treating as absent");
            return None;
        }
        let (tag, body) = blob.split_at(TAG_LEN);
        let mut mac = HmacSha256::new_from_slice(self.keyring.store_key().expose()).ok()?;
        mac.update(body);
        if mac.verify_slice(tag).is_err() {
            tracing::warn!("session blob failed integrity check, treating as absent");
            return None;
        }
        match serde_json::from_slice(body) {
            Ok(session) => Some(session),
            Err(error) => {
                tracing::warn!(%error, "session blob failed to deserialize, treating as absent");
                None
            }
        }
    }
}

impl SessionStore for MemoryStore {
    async fn get(
        &self,
        id: &SessionId,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> Result<Option<Session>, StoreError> {
        let now = unix_now();
        let skey = keys::session_map(&self.prefix, user_id, session_type);

        let blob = {
            let mut ks = self.keyspace.lock();
            purge_expired(&mut ks, &skey, now);
            match ks.get(&skey) {
                Some(Keyed { entry: Entry::Blobs(m), .. }) => m.get(&id.0).cloned(),
                _ => None,
            }
        };

        Ok(blob
            .and_then(|b| self.open(&b))
            .filter(|s| s.belongs_to(user_id, session_type) && !s.is_expired(now)))
    }

    async fn upsert(&self, session: &Session) -> Result<Upsert, StoreError> {
        let now = unix_now();
        let sid = session.id.0.clone();
        let skey = keys::session_map(&self.prefix, &session.user_id, &session.session_type);
        let ekey = keys::expiration_set(&self.prefix, &session.user_id, &session.session_type);
        let lkey = keys::lock_map(&self.prefix, &session.user_id, &session.session_type);

        let mut ks = self.keyspace.lock();
        for key in [&skey, &ekey, &lkey] {
            purge_expired(&mut ks, key, now);
        }

        // The lock check comes first: a stale writer learns about the
        // conflict even when the window it is trying to write has
        // already passed.
        let stored_version = match ks.get(&lkey) {
            Some(Keyed { entry: Entry::Versions(m), .. }) => m.get(&sid).copied(),
            _ => None,
        };
        if let Some(v) = stored_version {
            if session.lock_version != v + 1 {
                return Ok(Upsert::Conflict);
            }
        }

        // A write that would land already-dead is a no-op.
        if session.is_expired(now) {
            return Ok(Upsert::Stored);
        }

        let blob = self.seal(session)?;

        // The atomic batch: blob, score, lock version, then TTLs.
        let fallback_exp = session.refresh_expires_at;
        let keyed = ks
            .entry(skey.clone())
            .or_insert_with(|| Keyed { entry: Entry::Blobs(HashMap::new()), expires_at: fallback_exp });
        if let Entry::Blobs(m) = &mut keyed.entry {
            m.insert(sid.clone(), blob);
        }
        let keyed = ks
            .entry(ekey.clone())
            .or_insert_with(|| Keyed { entry: Entry::Scores(HashMap::new()), expires_at: fallback_exp });
        if let Entry::Scores(m) = &mut keyed.entry {
            m.insert(sid.clone(), session.refresh_expires_at);
        }
        let keyed = ks
            .entry(lkey.clone())
            .or_insert_with(|| Keyed { entry: Entry::Versions(HashMap::new()), expires_at: fallback_exp });
        if let Entry::Versions(m) = &mut keyed.entry {
            m.insert(sid, session.lock_version);
        }

        // Collection TTLs only ever ratchet up here; delete recomputes.
        let max_score = match ks.get(&ekey) {
            Some(Keyed { entry: Entry::Scores(m), .. }) => {
                m.values().copied().max().unwrap_or(fallback_exp)
            }
            _ => fallback_exp,
        };
        for key in [&skey, &ekey, &lkey] {
            if let Some(keyed) = ks.get_mut(key.as_str()) {
                keyed.expires_at = keyed.expires_at.max(max_score);
            }
        }

        match prune_collections(&mut ks, &self.prefix, &session.user_id, &session.session_type, now)
        {
            Prune::Pruned(removed) => {
                tracing::debug!(removed, user_id = %session.user_id, "pruned expired sessions");
            }
            Prune::Skipped => {}
        }

        Ok(Upsert::Stored)
    }

    async fn delete(
        &self,
        id: &SessionId,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> Result<(), StoreError> {
        let now = unix_now();
        let skey = keys::session_map(&self.prefix, user_id, session_type);
        let ekey = keys::expiration_set(&self.prefix, user_id, session_type);
        let lkey = keys::lock_map(&self.prefix, user_id, session_type);

        let mut ks = self.keyspace.lock();
        for key in [&skey, &ekey, &lkey] {
            purge_expired(&mut ks, key, now);
        }

        if let Some(Keyed { entry: Entry::Blobs(m), .. }) = ks.get_mut(&skey) {
            m.remove(&id.0);
        }
        if let Some(Keyed { entry: Entry::Scores(m), .. }) = ks.get_mut(&ekey) {
            m.remove(&id.0);
        }
        if let Some(Keyed { entry: Entry::Versions(m), .. }) = ks.get_mut(&lkey) {
            m.remove(&id.0);
        }

        // Recompute the shared TTL from the remaining members.
        let max_score = match ks.get(&ekey) {
            Some(Keyed { entry: Entry::Scores(m), .. }) => m.values().copied().max(),
            _ => None,
        };
        match max_score {
            Some(max) => {
                for key in [&skey, &ekey, &lkey] {
                    if let Some(keyed) = ks.get_mut(key.as_str()) {
                        keyed.expires_at = max;
                    }
                }
            }
            None => {
                for key in [&skey, &ekey, &lkey] {
                    ks.remove(key.as_str());
                }
            }
        }

        Ok(())
    }

    async fn get_all(
        &self,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> Result<Vec<Session>, StoreError> {
        let now = unix_now();
        let skey = keys::session_map(&self.prefix, user_id, session_type);

        let blobs: Vec<Vec<u8>> = {
            let mut ks = self.keyspace.lock();
            purge_expired(&mut ks, &skey, now);
            match ks.get(&skey) {
                Some(Keyed { entry: Entry::Blobs(m), .. }) => m.values().cloned().collect(),
                _ => Vec::new(),
            }
        };

        Ok(blobs
            .iter()
            .filter_map(|b| self.open(b))
            .filter(|s| s.belongs_to(user_id, session_type) && !s.is_expired(now))
            .collect())
    }

    async fn delete_all(
        &self,
        user_id: &UserId,
        session_type: &SessionType,
    ) -> Result<(), StoreError> {
        let mut ks = self.keyspace.lock();
        ks.remove(&keys::session_map(&self.prefix, user_id, session_type));
        ks.remove(&keys::expiration_set(&self.prefix, user_id, session_type));
        ks.remove(&keys::lock_map(&self.prefix, user_id, session_type));
        ks.remove(&keys::prune_lock(&self.prefix, user_id, session_type));
        Ok(())
    }
}

/// Drop a collection whose absolute expiry has passed.
fn purge_expired(ks: &mut HashMap<String, Keyed>, key: &str, now: i64) {
    if ks.get(key).is_some_and(|k| k.expires_at < now) {
        ks.remove(key);
    }
}

fn prune_collections(
    ks: &mut HashMap<String, Keyed>,
    prefix: &str,
    user_id: &UserId,
    session_type: &SessionType,
    now: i64,
) -> Prune {
    let plkey = keys::prune_lock(prefix, user_id, session_type);
    purge_expired(ks, &plkey, now);
    if ks.contains_key(&plkey) {
        return Prune::Skipped;
    }
    ks.insert(
        plkey,
        Keyed { entry: Entry::Flag, expires_at: now + PRUNE_COOLDOWN_SECS },
    );

    let skey = keys::session_map(prefix, user_id, session_type);
    let ekey = keys::expiration_set(prefix, user_id, session_type);
    let lkey = keys::lock_map(prefix, user_id, session_type);

    let dead: Vec<String> = match ks.get(&ekey) {
        Some(Keyed { entry: Entry::Scores(m), .. }) => m
            .iter()
            .filter(|(_, score)| **score < now)
            .map(|(sid, _)| sid.clone())
            .collect(),
        _ => Vec::new(),
    };

    for sid in &dead {
        if let Some(Keyed { entry: Entry::Scores(m), .. }) = ks.get_mut(&ekey) {
            m.remove(sid);
        }
        if let Some(Keyed { entry: Entry::Blobs(m), .. }) = ks.get_mut(&skey) {
            m.remove(sid);
        }
        if let Some(Keyed { entry: Entry::Versions(m), .. }) = ks.get_mut(&lkey) {
            m.remove(sid);
        }
    }

    Prune::Pruned(dead.len())
}
