//! Provider trait for abstracting model backends
//!
//! Enables swapping between OpenRouter, Ollama and the scripted test provider.

use async_trait::async_trait;

use crate::core::{Message, Result, ToolSchema};

/// What a provider can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub supports_tools: bool,
    pub supports_streaming: bool,
    pub supports_vision: bool,
    /// Context window of the model, in tokens
    pub max_context_tokens: usize,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: true,
            supports_streaming: false,
            supports_vision: false,
            max_context_tokens: 128_000,
        }
    }
}

/// Rough token count: a quarter token per character plus framing per message.
pub fn heuristic_token_estimate(messages: &[Message]) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    chars / 4 + 4 * messages.len()
}

/// Trait for model providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Produce one assistant message. Tool-call intent is carried in
    /// `metadata.tool_calls`.
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolSchema]>,
    ) -> Result<Message>;

    /// Non-authoritative token estimate for context budgeting
    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        heuristic_token_estimate(messages)
    }

    fn capabilities(&self) -> ProviderCapabilities;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Model identifier requests are sent with
    fn model(&self) -> &str;
}
