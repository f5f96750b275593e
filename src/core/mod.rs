//! Core module - shared infrastructure for detective
//!
//! Foundational types, configuration, error handling, logging and the retry
//! executor used throughout the crate.

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;
pub mod types;

pub use config::Config;
pub use error::{AgentError, Result};
pub use retry::{execute_with_retry, RetryConfig, RetryExecutor, Sleeper, TokioSleeper};
pub use types::*;
