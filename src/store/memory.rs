//! In-memory conversation store for tests and throwaway agents

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agent::Conversation;
use crate::core::{AgentError, Result};
use crate::store::ConversationStore;

#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    records: RwLock<BTreeMap<String, String>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn save(&self, conversation: &Conversation) -> Result<()> {
        // Stored serialized so loads behave like the file store.
        let body = serde_json::to_string(conversation)?;
        self.records
            .write()
            .await
            .insert(conversation.id.clone(), body);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        let records = self.records.read().await;
        let body = records
            .get(id)
            .ok_or_else(|| AgentError::NotFound(format!("conversation {}", id)))?;
        serde_json::from_str(body).map_err(|e| AgentError::CorruptRecord {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryConversationStore::new();
        let mut conv = Conversation::new("sys");
        conv.push(Message::user("what is 2+2")).unwrap();

        store.save(&conv).await.unwrap();
        assert_eq!(store.load(&conv.id).await.unwrap(), conv);
        assert_eq!(store.list().await.unwrap(), vec![conv.id.clone()]);
        assert!(store.delete(&conv.id).await.unwrap());
        assert!(matches!(store.load(&conv.id).await, Err(AgentError::NotFound(_))));
    }
}
