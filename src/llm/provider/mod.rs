//! Provider implementations and factory
//!
//! Submodules implement specific providers (OpenRouter, Ollama, Scripted).

pub mod ollama;
pub mod openrouter;
pub mod scripted;

use std::sync::Arc;

use crate::core::config::{ProviderConfig, ProviderKind};
use crate::core::Result;
use crate::llm::traits::Provider;

pub use self::ollama::OllamaProvider;
pub use self::openrouter::OpenRouterProvider;
pub use self::scripted::{RecordedRequest, ScriptedProvider};

/// Create a provider based on configuration
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::OpenRouter => Arc::new(OpenRouterProvider::from_config(config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_config(config)?),
        ProviderKind::Scripted => Arc::new(ScriptedProvider::echo()),
    };
    Ok(provider)
}
