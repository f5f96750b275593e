//! Conversation history management
//!
//! A conversation is the persisted unit: id, system prompt, ordered messages
//! and metadata. The system prompt is kept apart from the history and put in
//! front of it for every provider call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::{AgentError, Message, Metadata, Result, Role};

/// Metadata key holding the conversation's trace id
pub const META_TRACE_ID: &str = "trace_id";

/// One dialogue with its full history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub system_prompt: String,
    /// History, oldest first; never contains the system prompt
    messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Conversation {
    /// Create a new conversation; the trace id is derived from the id
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        let trace_id = Self::derive_trace_id(&id);
        Self::build(id, system_prompt.into(), trace_id)
    }

    /// Create a new conversation bound to an existing trace
    pub fn with_trace_id(system_prompt: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::build(Uuid::new_v4().to_string(), system_prompt.into(), trace_id.into())
    }

    fn build(id: String, system_prompt: String, trace_id: String) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(META_TRACE_ID.to_string(), Value::String(trace_id));
        Self {
            id,
            system_prompt,
            messages: Vec::new(),
            created_at: Utc::now(),
            metadata,
        }
    }

    /// Deterministic trace id for a conversation id
    pub fn derive_trace_id(conversation_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, conversation_id.as_bytes())
            .simple()
            .to_string()
    }

    /// Trace id from metadata, falling back to the derived one
    pub fn trace_id(&self) -> String {
        self.metadata
            .get(META_TRACE_ID)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| Self::derive_trace_id(&self.id))
    }

    /// Append a message. Tool messages must reference a tool call.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if message.role == Role::Tool && message.tool_call_id().is_none() {
            return Err(AgentError::InvalidMessage(
                "tool message without tool_call_id".to_string(),
            ));
        }
        if message.role == Role::System {
            return Err(AgentError::InvalidMessage(
                "system prompt is not part of the history".to_string(),
            ));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Message history without the system prompt
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// System prompt followed by the whole history
    pub fn provider_messages(&self) -> Vec<Message> {
        let mut result = Vec::with_capacity(self.messages.len() + 1);
        result.push(self.system_message());
        result.extend(self.messages.iter().cloned());
        result
    }

    /// The system prompt as a message
    pub fn system_message(&self) -> Message {
        Message::system(self.system_prompt.clone())
    }

    /// Get the last N messages
    pub fn last_n(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Get the last assistant message
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Get message count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
