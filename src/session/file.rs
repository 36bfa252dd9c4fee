//! JSON file-based session store: one document per session.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::{SessionError, SessionId, SessionState, SessionStore};

/// Persists each session as `session-<id>.json` under a base directory.
///
/// Writes go through a temp file followed by a rename so a crash never
/// leaves a half-written document behind.
pub struct FileSessionStore {
    base_dir: PathBuf,
    persist_lock: Mutex<()>,
}

impl FileSessionStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self, SessionError> {
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            persist_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, id: SessionId) -> PathBuf {
        self.base_dir.join(format!("session-{}.json", id))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        let _guard = self.persist_lock.lock().await;

        let path = self.path_for(state.session_id);
        let data = serde_json::to_vec_pretty(state)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn load(&self, id: SessionId) -> Result<SessionState, SessionError> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}
