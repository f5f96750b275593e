//! Agent module - orchestration and conversation management
//!
//! Contains the agent loop, its state machine, context window selection and
//! the conversation model.

pub mod context;
pub mod conversation;
pub mod loop_state;
pub mod orchestrator;

pub use context::{ContextSelection, ContextWindowManager};
pub use conversation::Conversation;
pub use loop_state::{AgentState, LoopState};
pub use orchestrator::{Agent, AgentBuilder, AgentOptions};
