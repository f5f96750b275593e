//! Conversation persistence
//!
//! A [`ConversationStore`] saves and loads whole conversations by id.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::agent::Conversation;
use crate::core::{AgentError, Result};

pub use file::FileConversationStore;
pub use memory::MemoryConversationStore;

/// Storage for conversations, keyed by conversation id
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist the whole conversation, replacing any previous version
    async fn save(&self, conversation: &Conversation) -> Result<()>;

    /// Load a conversation. Missing ids fail with `NotFound`.
    async fn load(&self, id: &str) -> Result<Conversation>;

    /// Ids of stored conversations, sorted
    async fn list(&self) -> Result<Vec<String>>;

    /// Remove a conversation; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn exists(&self, id: &str) -> Result<bool> {
        match self.load(id).await {
            Ok(_) => Ok(true),
            Err(AgentError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Reject ids that could escape a storage directory
pub fn validate_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0');
    if bad {
        return Err(AgentError::validation(format!("invalid id: {:?}", id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("3f1c2a9e-8d1b-4c53-9a35-0b4b8d0f6e1a").is_ok());
        assert!(validate_id("trace_01").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a\\b").is_err());
    }
}
