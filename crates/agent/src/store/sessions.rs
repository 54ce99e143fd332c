//! Session Store (§4.D): CRUD over sessions keyed by a date-prefixed,
//! random-suffixed id, with `last_modified`-descending listing. Grounded on
//! `querymt::session::store::SessionStore` (async trait, `thiserror`-derived
//! error enum), narrowed from the teacher's single sprawling trait (tasks,
//! decisions, delegations, forks, artifacts) to the two operations this
//! system actually needs: metadata CRUD and message-store handoff.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::AgentState;
use crate::error::AgentError;
use crate::store::messages::{ChatMessageStore, FilesystemMessageStore, InMemoryMessageStore};

/// A live session: metadata plus a handle to its message store. `agent_state`
/// is process-local and never persisted; a reloaded session always starts
/// `Idle` (§4.H owns the actual state machine once an `Agent` picks it up).
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub provider_id: String,
    pub model_id: String,
    pub agent_state: AgentState,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub chat_store: Arc<dyn ChatMessageStore>,
}

/// The subset of `Session` written to `metadata.yaml` (§6 "Persisted
/// state"). `name` is carried beyond the spec's literal four fields since
/// the HTTP UI collaborator surface needs session rename/listing by name;
/// everything else matches spec.md's field list exactly.
#[derive(Debug, Serialize, Deserialize)]
struct SessionMetadata {
    #[serde(rename = "providerID")]
    provider_id: String,
    #[serde(rename = "modelID")]
    model_id: String,
    name: String,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "lastAccessed")]
    last_accessed: DateTime<Utc>,
}

fn new_session_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: String = {
        let mut rng = rand::rng();
        (0..6)
            .map(|_| std::char::from_digit(rng.random_range(0..16), 16).unwrap())
            .collect()
    };
    format!("{date}-{suffix}")
}

/// Metadata-only CRUD surface; see module docs for what's deliberately left
/// out of the teacher's much larger trait.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(
        &self,
        name: String,
        provider_id: String,
        model_id: String,
    ) -> Result<Session, AgentError>;
    async fn get(&self, id: &str) -> Result<Session, AgentError>;
    async fn update(&self, session: &Session) -> Result<(), AgentError>;
    async fn delete(&self, id: &str) -> Result<(), AgentError>;
    /// Sorted by `last_modified` descending.
    async fn list(&self) -> Result<Vec<Session>, AgentError>;
}

/// Pure in-memory backend; also used as the fallback target of
/// [`FilesystemSessionStore`] when disk operations fail.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        InMemorySessionStore {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, session: Session) {
        self.sessions.lock().insert(session.id.clone(), session);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(
        &self,
        name: String,
        provider_id: String,
        model_id: String,
    ) -> Result<Session, AgentError> {
        let now = Utc::now();
        let session = Session {
            id: new_session_id(),
            name,
            provider_id,
            model_id,
            agent_state: AgentState::Idle,
            created_at: now,
            last_modified: now,
            chat_store: Arc::new(InMemoryMessageStore::new()),
        };
        self.insert(session.clone());
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Session, AgentError> {
        self.sessions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))
    }

    async fn update(&self, session: &Session) -> Result<(), AgentError> {
        let mut guard = self.sessions.lock();
        if !guard.contains_key(&session.id) {
            return Err(AgentError::SessionNotFound(session.id.clone()));
        }
        let mut updated = session.clone();
        updated.last_modified = Utc::now();
        guard.insert(updated.id.clone(), updated);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AgentError> {
        self.sessions
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Session>, AgentError> {
        let mut sessions: Vec<Session> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(sessions)
    }
}

/// Filesystem backend: one directory per session under `base_dir`, holding
/// `metadata.yaml` (this module) and `history.json` (owned by
/// [`FilesystemMessageStore`]). Every operation mirrors into an in-memory map
/// first so a disk failure degrades to memory-only behavior rather than
/// failing the caller (§4.D "filesystem falls back to memory on failure").
pub struct FilesystemSessionStore {
    base_dir: PathBuf,
    memory: InMemorySessionStore,
}

impl FilesystemSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FilesystemSessionStore {
            base_dir: base_dir.into(),
            memory: InMemorySessionStore::new(),
        }
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(id)
    }

    fn metadata_of(session: &Session) -> SessionMetadata {
        SessionMetadata {
            provider_id: session.provider_id.clone(),
            model_id: session.model_id.clone(),
            name: session.name.clone(),
            created_at: session.created_at,
            last_accessed: session.last_modified,
        }
    }

    async fn persist(&self, session: &Session) {
        let dir = self.session_dir(&session.id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            log::warn!("session store: failed to create {}: {e}", dir.display());
            return;
        }
        let meta = Self::metadata_of(session);
        let yaml = match serde_yaml::to_string(&meta) {
            Ok(y) => y,
            Err(e) => {
                log::warn!("session store: failed to serialize metadata: {e}");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(dir.join("metadata.yaml"), yaml).await {
            log::warn!("session store: failed to write metadata.yaml: {e}");
        }
    }

    async fn load_from_disk(&self, id: &str) -> Option<Session> {
        let dir = self.session_dir(id);
        let bytes = tokio::fs::read(dir.join("metadata.yaml")).await.ok()?;
        let meta: SessionMetadata = serde_yaml::from_slice(&bytes)
            .map_err(|e| log::warn!("session store: malformed metadata.yaml for {id}: {e}"))
            .ok()?;
        Some(Session {
            id: id.to_string(),
            name: meta.name,
            provider_id: meta.provider_id,
            model_id: meta.model_id,
            agent_state: AgentState::Idle,
            created_at: meta.created_at,
            last_modified: meta.last_accessed,
            chat_store: Arc::new(FilesystemMessageStore::new(dir)),
        })
    }
}

#[async_trait]
impl SessionStore for FilesystemSessionStore {
    async fn create(
        &self,
        name: String,
        provider_id: String,
        model_id: String,
    ) -> Result<Session, AgentError> {
        let now = Utc::now();
        let id = new_session_id();
        let session = Session {
            id: id.clone(),
            name,
            provider_id,
            model_id,
            agent_state: AgentState::Idle,
            created_at: now,
            last_modified: now,
            chat_store: Arc::new(FilesystemMessageStore::new(self.session_dir(&id))),
        };
        self.persist(&session).await;
        self.memory.insert(session.clone());
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Session, AgentError> {
        if let Ok(session) = self.memory.get(id).await {
            return Ok(session);
        }
        if let Some(session) = self.load_from_disk(id).await {
            self.memory.insert(session.clone());
            return Ok(session);
        }
        Err(AgentError::SessionNotFound(id.to_string()))
    }

    async fn update(&self, session: &Session) -> Result<(), AgentError> {
        self.persist(session).await;
        self.memory.update(session).await.or_else(|_| {
            self.memory.insert(session.clone());
            Ok(())
        })
    }

    async fn delete(&self, id: &str) -> Result<(), AgentError> {
        let dir = self.session_dir(id);
        if dir.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                log::warn!("session store: failed to remove {}: {e}", dir.display());
            }
        }
        self.memory.delete(id).await
    }

    async fn list(&self) -> Result<Vec<Session>, AgentError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("session store: failed to read {}: {e}", self.base_dir.display());
                return self.memory.list().await;
            }
        };
        let mut sessions = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(id) = entry.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            if let Some(session) = self.load_from_disk(&id).await {
                self.memory.insert(session.clone());
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_create_get_roundtrip() {
        let store = InMemorySessionStore::new();
        let session = store
            .create("demo".into(), "anthropic".into(), "claude".into())
            .await
            .unwrap();
        let fetched = store.get(&session.id).await.unwrap();
        assert_eq!(fetched.name, "demo");
    }

    #[tokio::test]
    async fn session_id_is_date_prefixed() {
        let store = InMemorySessionStore::new();
        let session = store
            .create("demo".into(), "anthropic".into(), "claude".into())
            .await
            .unwrap();
        let today = Utc::now().format("%Y%m%d").to_string();
        assert!(session.id.starts_with(&today));
        assert_eq!(session.id.len(), today.len() + 1 + 6);
    }

    #[tokio::test]
    async fn list_sorts_last_modified_descending() {
        let store = InMemorySessionStore::new();
        let a = store.create("a".into(), "p".into(), "m".into()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = store.create("b".into(), "p".into(), "m".into()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.update(&a).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].id, a.id);
        assert_eq!(listed[1].id, b.id);
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = InMemorySessionStore::new();
        let session = store.create("demo".into(), "p".into(), "m".into()).await.unwrap();
        store.delete(&session.id).await.unwrap();
        assert!(store.get(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn filesystem_store_persists_and_reloads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemSessionStore::new(dir.path());
        let session = store
            .create("demo".into(), "anthropic".into(), "claude-3".into())
            .await
            .unwrap();

        let reopened = FilesystemSessionStore::new(dir.path());
        let fetched = reopened.get(&session.id).await.unwrap();
        assert_eq!(fetched.provider_id, "anthropic");
        assert_eq!(fetched.model_id, "claude-3");

        let yaml = tokio::fs::read_to_string(dir.path().join(&session.id).join("metadata.yaml"))
            .await
            .unwrap();
        assert!(yaml.contains("providerID"));
    }

    #[tokio::test]
    async fn filesystem_store_list_sorts_descending() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemSessionStore::new(dir.path());
        store.create("a".into(), "p".into(), "m".into()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create("b".into(), "p".into(), "m".into()).await.unwrap();

        let reopened = FilesystemSessionStore::new(dir.path());
        let listed = reopened.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].last_modified >= listed[1].last_modified);
    }
}
