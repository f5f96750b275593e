//! LLM module - model provider integrations
//!
//! Provides the provider abstraction and its OpenRouter, Ollama and scripted
//! implementations.

pub mod provider;
pub mod traits;

pub use provider::{create_provider, OllamaProvider, OpenRouterProvider, ScriptedProvider};
pub use traits::{heuristic_token_estimate, Provider, ProviderCapabilities};
