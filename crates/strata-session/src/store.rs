//! Atomic file-backed session store.
//!
//! Layout: `<root>/<owner_id>/<session_id>.json`, UTF-8. Writes go to
//! a temp file in the same directory and are renamed into place, so a
//! reader never observes a partially-written session. Writers to the
//! same session serialize behind a per-session async lock.

use dashmap::DashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use strata_core::{OwnerId, SessionId};

use crate::error::{SessionError, SessionResult};
use crate::model::Session;

/// Purgeable session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    /// The ordered message list.
    ChatObject,
    /// Per-turn workflow traces.
    WorkflowHistory,
    /// Module-scoped scratch state.
    ModuleState,
}

impl SessionField {
    /// Parse a field name from the REST surface.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown field names.
    pub fn parse(name: &str) -> SessionResult<Self> {
        match name {
            "chat_object" => Ok(Self::ChatObject),
            "workflow_history" => Ok(Self::WorkflowHistory),
            "module_state" => Ok(Self::ModuleState),
            other => Err(SessionError::UnknownField(other.to_string())),
        }
    }
}

/// File-backed session store.
pub struct SessionStore {
    root: PathBuf,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Create a store rooted at `root`. The directory is created on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    fn session_path(&self, owner_id: OwnerId, session_id: SessionId) -> PathBuf {
        self.root
            .join(owner_id.to_string())
            .join(format!("{session_id}.json"))
    }

    fn lock_for(&self, session_id: SessionId) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load a session, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a corrupt file.
    pub async fn load(
        &self,
        owner_id: OwnerId,
        session_id: SessionId,
    ) -> SessionResult<Option<Session>> {
        let path = self.session_path(owner_id, session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session: Session =
            serde_json::from_slice(&bytes).map_err(|e| SessionError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        session.check()?;
        Ok(Some(session))
    }

    /// Save a session atomically.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or serialization failure.
    pub async fn save(&self, owner_id: OwnerId, session: &Session) -> SessionResult<()> {
        let lock = self.lock_for(session.id);
        let _guard = lock.lock().await;

        let path = self.session_path(owner_id, session.id);
        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        let write_path = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&write_path, &json))
            .await
            .map_err(|e| SessionError::Serialization(format!("write task aborted: {e}")))??;

        debug!(session = %session.id, "Session saved");
        Ok(())
    }

    /// Clear one field of a stored session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub async fn purge_field(
        &self,
        owner_id: OwnerId,
        session_id: SessionId,
        field: SessionField,
    ) -> SessionResult<()> {
        let mut session = self
            .load(owner_id, session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        match field {
            SessionField::ChatObject => session.chat_object.clear(),
            SessionField::WorkflowHistory => session.workflow_history.clear(),
            SessionField::ModuleState => session.module_state.clear(),
        }
        session.updated_at = chrono::Utc::now();
        self.save(owner_id, &session).await
    }

    /// List all sessions for an owner, most recently updated first.
    ///
    /// Unreadable files are skipped with a warning rather than failing
    /// the listing.
    ///
    /// # Errors
    ///
    /// Returns an error only if the owner directory cannot be read.
    pub async fn list(&self, owner_id: OwnerId) -> SessionResult<Vec<Session>> {
        let dir = self.root.join(owner_id.to_string());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Session>(&bytes) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping corrupt session file");
                    },
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable session file");
                },
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Toggle the archived flag.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub async fn set_archived(
        &self,
        owner_id: OwnerId,
        session_id: SessionId,
        archived: bool,
    ) -> SessionResult<()> {
        let mut session = self
            .load(owner_id, session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.is_archived = archived;
        session.updated_at = chrono::Utc::now();
        self.save(owner_id, &session).await
    }

    /// Delete a session file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the session does not exist.
    pub async fn delete(&self, owner_id: OwnerId, session_id: SessionId) -> SessionResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let path = self.session_path(owner_id, session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.locks.remove(&session_id);
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::NotFound(session_id.to_string()))
            },
            Err(e) => Err(e.into()),
        }
    }
}

/// Temp-file + rename write in the target's directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> SessionResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| SessionError::Serialization("session path has no parent".to_string()))?;
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut temp, bytes)?;
    temp.flush()?;
    temp.persist(path)
        .map_err(|e| SessionError::Io(e.error))?;
    Ok(())
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatMessage;
    use strata_core::ProfileId;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (_dir, store) = store();
        let owner = OwnerId::new();
        let mut session = Session::new(owner, ProfileId::new());
        session.push_message(ChatMessage::user("hello"));

        store.save(owner, &session).await.unwrap();
        let loaded = store.load(owner, session.id).await.unwrap().unwrap();
        assert_eq!(loaded.chat_object.len(), 1);
        assert_eq!(loaded.id, session.id);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let (_dir, store) = store();
        let loaded = store.load(OwnerId::new(), SessionId::new()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_purge_chat_object() {
        let (_dir, store) = store();
        let owner = OwnerId::new();
        let mut session = Session::new(owner, ProfileId::new());
        session.push_message(ChatMessage::user("hello"));
        session.push_trace(crate::model::TurnTrace {
            turn_number: 1,
            execution_trace: vec![],
            is_valid: true,
        });
        session.counters.turn_count = 1;
        store.save(owner, &session).await.unwrap();

        store
            .purge_field(owner, session.id, SessionField::ChatObject)
            .await
            .unwrap();

        let loaded = store.load(owner, session.id).await.unwrap().unwrap();
        assert!(loaded.chat_object.is_empty());
        assert_eq!(loaded.workflow_history.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_missing_session() {
        let (_dir, store) = store();
        let result = store
            .purge_field(OwnerId::new(), SessionId::new(), SessionField::ChatObject)
            .await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_sorted_by_update() {
        let (_dir, store) = store();
        let owner = OwnerId::new();

        let old = Session::new(owner, ProfileId::new());
        store.save(owner, &old).await.unwrap();

        let mut newer = Session::new(owner, ProfileId::new());
        newer.updated_at = chrono::Utc::now() + chrono::Duration::seconds(5);
        store.save(owner, &newer).await.unwrap();

        let sessions = store.list(owner).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = store();
        let owner = OwnerId::new();
        let session = Session::new(owner, ProfileId::new());
        store.save(owner, &session).await.unwrap();

        store.delete(owner, session.id).await.unwrap();
        assert!(store.load(owner, session.id).await.unwrap().is_none());
        assert!(store.delete(owner, session.id).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_saves_serialize() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let owner = OwnerId::new();
        let session = Session::new(owner, ProfileId::new());
        store.save(owner, &session).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8u64 {
            let store = Arc::clone(&store);
            let mut copy = session.clone();
            handles.push(tokio::spawn(async move {
                copy.counters.turn_count = i;
                store.save(owner, &copy).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Whatever order won, the file is a complete valid session.
        let loaded = store.load(owner, session.id).await.unwrap().unwrap();
        assert!(loaded.counters.turn_count < 8);
    }

    #[test]
    fn test_field_parse() {
        assert!(SessionField::parse("chat_object").is_ok());
        assert!(SessionField::parse("workflow_history").is_ok());
        assert!(SessionField::parse("nope").is_err());
    }
}
