//! Bounded registry of live sessions.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chat::session::{Session, SessionId};

/// Live sessions keyed by id; the least recently used one is dropped when full.
pub struct SessionRegistry {
    sessions: Mutex<LruCache<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create a registry holding at most `capacity` sessions.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Register a session and return a shared handle to it.
    pub async fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let mut sessions = self.sessions.lock().await;
        if let Some((evicted, _)) = sessions.push(session.id(), Arc::clone(&session))
            && evicted != session.id()
        {
            info!("Evicted least recently used session {evicted}");
        }
        session
    }

    /// Look up a session, marking it as recently used.
    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Drop a session. Returns whether it existed.
    pub async fn remove(&self, id: SessionId) -> bool {
        let removed = self.sessions.lock().await.pop(&id).is_some();
        if removed {
            debug!("Removed session {id}");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
