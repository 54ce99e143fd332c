//! Chat Message Store (§4.C): append/replace_all/list/clear over a
//! session's ordered history. Grounded on `querymt::session::{in_memory,
//! store}`'s trait/impl split, generalized from session-entry storage to
//! the spec's narrower message-store contract, plus a filesystem JSONL
//! implementation with legacy-JSON-array read-path migration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kubeagent_core::message::Message;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::error::AgentError;

/// One mutator per session (§5 "single-writer per session"); readers get a
/// cloned snapshot.
#[async_trait]
pub trait ChatMessageStore: Send + Sync {
    async fn append(&self, message: Message) -> Result<(), AgentError>;
    async fn replace_all(&self, messages: Vec<Message>) -> Result<(), AgentError>;
    async fn list(&self) -> Result<Vec<Message>, AgentError>;
    async fn clear(&self) -> Result<(), AgentError>;
}

/// In-memory store: a mutex-guarded `Vec`, copied on every read.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        InMemoryMessageStore {
            messages: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatMessageStore for InMemoryMessageStore {
    async fn append(&self, message: Message) -> Result<(), AgentError> {
        self.messages.lock().push(message);
        Ok(())
    }

    async fn replace_all(&self, messages: Vec<Message>) -> Result<(), AgentError> {
        *self.messages.lock() = messages;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Message>, AgentError> {
        Ok(self.messages.lock().clone())
    }

    async fn clear(&self) -> Result<(), AgentError> {
        self.messages.lock().clear();
        Ok(())
    }
}

/// Filesystem store: one JSONL file per session directory
/// (`<dir>/history.json`, one `Message` per line). A legacy history
/// persisted as a single JSON array is read-compatible and rewritten as
/// JSONL on the next mutation (§6 "Persisted state").
pub struct FilesystemMessageStore {
    path: PathBuf,
    cache: Arc<Mutex<Option<Vec<Message>>>>,
}

impl FilesystemMessageStore {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        FilesystemMessageStore {
            path: session_dir.into().join("history.json"),
            cache: Arc::new(Mutex::new(None)),
        }
    }

    async fn read_from_disk(path: &Path) -> Result<Vec<Message>, AgentError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AgentError::Store(e.to_string())),
        };
        let text = String::from_utf8_lossy(&bytes);
        let trimmed = text.trim_start();

        // Legacy single JSON array: read-compatible, migrated to JSONL on
        // the next write.
        if trimmed.starts_with('[') {
            return serde_json::from_str(&text).map_err(|e| AgentError::Store(e.to_string()));
        }

        let mut messages = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let msg: Message =
                serde_json::from_str(line).map_err(|e| AgentError::Store(e.to_string()))?;
            messages.push(msg);
        }
        Ok(messages)
    }

    async fn write_to_disk(path: &Path, messages: &[Message]) -> Result<(), AgentError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::Store(e.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| AgentError::Store(e.to_string()))?;
        let mut buf = String::new();
        for message in messages {
            buf.push_str(
                &serde_json::to_string(message).map_err(|e| AgentError::Store(e.to_string()))?,
            );
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| AgentError::Store(e.to_string()))?;
        file.flush().await.map_err(|e| AgentError::Store(e.to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| AgentError::Store(e.to_string()))?;
        Ok(())
    }

    async fn loaded(&self) -> Result<Vec<Message>, AgentError> {
        if let Some(cached) = self.cache.lock().clone() {
            return Ok(cached);
        }
        let messages = Self::read_from_disk(&self.path).await?;
        *self.cache.lock() = Some(messages.clone());
        Ok(messages)
    }
}

#[async_trait]
impl ChatMessageStore for FilesystemMessageStore {
    async fn append(&self, message: Message) -> Result<(), AgentError> {
        let mut messages = self.loaded().await?;
        messages.push(message);
        Self::write_to_disk(&self.path, &messages).await?;
        *self.cache.lock() = Some(messages);
        Ok(())
    }

    async fn replace_all(&self, messages: Vec<Message>) -> Result<(), AgentError> {
        Self::write_to_disk(&self.path, &messages).await?;
        *self.cache.lock() = Some(messages);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Message>, AgentError> {
        self.loaded().await
    }

    async fn clear(&self) -> Result<(), AgentError> {
        self.replace_all(Vec::new()).await
    }
}
