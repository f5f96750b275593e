//! Detective - conversational agent core
//!
//! Runs a bounded tool-calling loop against an LLM provider, keeps the
//! context within the provider's window, retries transient failures, traces
//! every step and persists conversations.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, retry and error handling
//! - **LLM**: Provider abstraction with OpenRouter, Ollama and scripted backends
//! - **Tools**: Tool registry, executor and the release assessment tools
//! - **Agent**: Orchestration loop, context window and conversation model
//! - **Observability**: Spans, tracer and JSONL trace export
//! - **Store**: Conversation persistence
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use detective::{Agent, Config};
//!
//! #[tokio::main]
//! async fn main() -> detective::Result<()> {
//!     let config = Config::load(None)?;
//!     let mut agent = Agent::from_config(&config)?;
//!
//!     let reply = agent.send_message("Summarize release v1.0").await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod observability;
pub mod store;
pub mod tools;

// Re-export commonly used items
pub use agent::{Agent, AgentBuilder, AgentOptions, Conversation};
pub use cli::Repl;
pub use core::{AgentError, Config, Result};
