//! In-memory session store (non-persistent, for tests).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionError, SessionId, SessionState, SessionStore};

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently stored.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .insert(state.session_id, state.clone());
        Ok(())
    }

    async fn load(&self, id: SessionId) -> Result<SessionState, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }
}
