//! Session storage behind a small get/put/clear interface.

use crate::error::SessionError;
use crate::types::{Session, SessionId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::sync::RwLock;

/// Boxed future returned by [`SessionStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Keyed storage of per-browser sessions.
///
/// `get` never fails for an unknown id: it returns `Session::default()`.
/// Dyn-compatible so the orchestrator can hold an `Arc<dyn SessionStore>`.
pub trait SessionStore: Send + Sync {
    /// Load a session, defaulting to an empty one when absent.
    fn get(&self, id: SessionId) -> StoreFuture<'_, Session>;

    /// Overwrite the stored session wholesale.
    fn put<'a>(&'a self, id: SessionId, session: &'a Session) -> StoreFuture<'a, ()>;

    /// Remove the session. Clearing an unknown id is a no-op.
    fn clear(&self, id: SessionId) -> StoreFuture<'_, ()>;

    /// Remove every session last updated before `cutoff`. Returns how many.
    fn prune_idle(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, usize>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Process-local store; sessions are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: SessionId) -> StoreFuture<'_, Session> {
        Box::pin(async move {
            Ok(self
                .sessions
                .read()
                .await
                .get(&id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn put<'a>(&'a self, id: SessionId, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.sessions.write().await.insert(id, session.clone());
            Ok(())
        })
    }

    fn clear(&self, id: SessionId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.sessions.write().await.remove(&id);
            Ok(())
        })
    }

    fn prune_idle(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, session| session.updated_at >= cutoff);
            Ok(before - sessions.len())
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// File-based store. Each session is a JSON file in `sessions_dir`.
pub struct FileSessionStore {
    sessions_dir: PathBuf,
}

impl FileSessionStore {
    /// Create a new store, ensuring `<data_dir>/sessions` exists.
    pub async fn new(data_dir: PathBuf) -> Result<Self, SessionError> {
        let sessions_dir = data_dir.join("sessions");
        tokio::fs::create_dir_all(&sessions_dir).await?;
        Ok(Self { sessions_dir })
    }

    fn session_path(&self, id: SessionId) -> PathBuf {
        self.sessions_dir.join(format!("{id}.json"))
    }

    async fn load(&self, id: SessionId) -> Result<Session, SessionError> {
        let path = self.session_path(id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Session::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Session>(&data) {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::warn!("Failed to parse session {}: {}, starting fresh", id.short(), e);
                Ok(Session::default())
            }
        }
    }

    /// Atomic write: .tmp then rename.
    async fn save(&self, id: SessionId, session: &Session) -> Result<(), SessionError> {
        let path = self.session_path(id);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn remove(&self, id: SessionId) -> Result<(), SessionError> {
        remove_if_present(&self.session_path(id)).await
    }

    /// Delete idle session files. Unreadable or corrupt files count as idle.
    async fn remove_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, SessionError> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.sessions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let idle = match tokio::fs::read_to_string(&path).await {
                Ok(data) => match serde_json::from_str::<Session>(&data) {
                    Ok(session) => session.updated_at < cutoff,
                    Err(e) => {
                        tracing::warn!("Removing unparseable session {}: {e}", path.display());
                        true
                    }
                },
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(e.into()),
            };
            if idle {
                remove_if_present(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

async fn remove_if_present(path: &Path) -> Result<(), SessionError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, id: SessionId) -> StoreFuture<'_, Session> {
        Box::pin(self.load(id))
    }

    fn put<'a>(&'a self, id: SessionId, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(self.save(id, session))
    }

    fn clear(&self, id: SessionId) -> StoreFuture<'_, ()> {
        Box::pin(self.remove(id))
    }

    fn prune_idle(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, usize> {
        Box::pin(self.remove_idle(cutoff))
    }

    fn name(&self) -> &str {
        "file"
    }
}
