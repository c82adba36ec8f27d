use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::{SessionError, SessionToken};

// -----------------------------------------------------------------------------
// ----- SessionStore ----------------------------------------------------------

/// Key-value persistence for session state.
///
/// The store only sees opaque bytes; serialization happens in
/// [`super::SessionManager`]. Retention (expiry) is the store's business.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite the state for `token`.
    async fn save(&self, token: &SessionToken, state: Bytes) -> Result<(), SessionError>;

    /// Fetch the state for `token`. A miss is `SessionError::StateNotFound`.
    async fn get(&self, token: &SessionToken) -> Result<Bytes, SessionError>;

    /// Drop the state for `token`. Deleting a missing entry is not an error.
    async fn delete(&self, token: &SessionToken) -> Result<(), SessionError>;
}

// -----------------------------------------------------------------------------
// ----- MemoryStore -----------------------------------------------------------

/// In-process store with a sliding TTL and a hard entry cap.
///
/// Used when no Redis URL is configured and throughout the tests. When the
/// cap is hit the least recently used session is evicted.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<LruCache<String, MemoryEntry>>,
    ttl: Duration,
}

#[derive(Debug)]
struct MemoryEntry {
    state: Bytes,
    expires_at: Instant,
}

impl MemoryStore {
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, token: &SessionToken, state: Bytes) -> Result<(), SessionError> {
        let entry = MemoryEntry {
            state,
            expires_at: Instant::now() + self.ttl,
        };

        if let Some((evicted, _)) = self.entries.lock().push(token.store_key(), entry) {
            if evicted != token.store_key() {
                debug!("memory session store full; evicted least recently used session");
            }
        }

        Ok(())
    }

    async fn get(&self, token: &SessionToken) -> Result<Bytes, SessionError> {
        let key = token.store_key();
        let now = Instant::now();

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&key) else {
            return Err(SessionError::StateNotFound);
        };

        if entry.expires_at <= now {
            entries.pop(&key);
            return Err(SessionError::StateNotFound);
        }

        entry.expires_at = now + self.ttl;
        Ok(entry.state.clone())
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), SessionError> {
        self.entries.lock().pop(&token.store_key());
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- RedisStore ------------------------------------------------------------

/// Redis-backed store: `SET sid:<token> <json> EX <ttl>`, refreshed on read.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisStore {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, SessionError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;

        info!("session store connected to redis");

        Ok(Self::with_connection(conn, ttl))
    }

    pub fn with_connection(conn: ConnectionManager, ttl: Duration) -> Self {
        Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        }
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn save(&self, token: &SessionToken, state: Bytes) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(token.store_key(), state.as_ref(), self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn get(&self, token: &SessionToken) -> Result<Bytes, SessionError> {
        let key = token.store_key();
        let mut conn = self.conn.clone();

        let state: Option<Vec<u8>> = conn.get(&key).await?;
        let Some(state) = state else {
            return Err(SessionError::StateNotFound);
        };

        // Sliding expiry: every authenticated read extends the session.
        let _: bool = conn.expire(&key, self.ttl_secs as i64).await?;

        Ok(Bytes::from(state))
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(token.store_key()).await?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
