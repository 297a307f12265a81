//! # Session Registry
//!
//! Maps session ids to their [`TranslationSession`]. The registry is an
//! ordinary value injected wherever it is needed (it is cheap to clone, all
//! clones share the same map), never a module-level global.
//!
//! ## Locking:
//! - The map itself sits behind a `tokio::sync::RwLock`, held only long enough
//!   to insert, look up or remove an entry.
//! - Each session has its own `tokio::sync::Mutex`, so mutations of one
//!   session are serialized while unrelated sessions never contend.
//! - Callers must not hold a session lock across a translation or a transport
//!   send; take a snapshot and drop the guard first.

use crate::error::{RelayError, RelayResult};
use crate::relay::session::{SessionConfig, TranslationSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<TranslationSession>>;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session.
    ///
    /// ## Returns:
    /// - **Ok(handle)**: session created
    /// - **Err(DuplicateSession)**: the id is already taken
    pub async fn create(&self, id: &str, config: SessionConfig) -> RelayResult<SessionHandle> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(id) {
            return Err(RelayError::DuplicateSession(id.to_string()));
        }

        let handle = Arc::new(Mutex::new(TranslationSession::new(id.to_string(), config)));
        sessions.insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Like [`get`](Self::get), but a miss is a [`RelayError::SessionNotFound`].
    pub async fn require(&self, id: &str) -> RelayResult<SessionHandle> {
        self.get(id)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))
    }

    /// Remove a session. Removing an absent id is a no-op.
    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
