//! File-backed conversation store
//!
//! One pretty-printed JSON file per conversation at `<dir>/<id>.json`. Writes
//! go to `<id>.json.tmp`, are fsynced, then renamed over the target so a crash
//! never leaves a half-written record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::agent::Conversation;
use crate::core::{AgentError, Result};
use crate::store::{validate_id, ConversationStore};

const EXTENSION: &str = ".json";

#[derive(Debug, Clone)]
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", id, EXTENSION))
    }

    async fn write_atomic(&self, id: &str, body: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(id);
        let tmp = self.dir.join(format!("{}{}.tmp", id, EXTENSION));

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(body).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &target).await?;

        // Best-effort: make the rename durable.
        if let Ok(dir) = fs::File::open(&self.dir).await {
            let _ = dir.sync_all().await;
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn save(&self, conversation: &Conversation) -> Result<()> {
        validate_id(&conversation.id)?;
        let body = serde_json::to_vec_pretty(conversation)?;

        self.write_atomic(&conversation.id, &body).await.map_err(|e| {
            error!(conversation = %conversation.id, error = %e, "failed to save conversation");
            AgentError::persistence(format!("saving {}: {}", conversation.id, e))
        })?;

        debug!(conversation = %conversation.id, messages = conversation.len(), "conversation saved");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        validate_id(id)?;
        let path = self.path_for(id);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgentError::NotFound(format!("conversation {}", id)));
            }
            Err(e) => {
                return Err(AgentError::CorruptRecord {
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| AgentError::CorruptRecord {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AgentError::persistence(format!("listing conversations: {}", e))),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgentError::persistence(format!("listing conversations: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(EXTENSION) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AgentError::persistence(format!("deleting {}: {}", id, e))),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        Ok(fs::try_exists(self.path_for(id)).await.unwrap_or(false))
    }
}
