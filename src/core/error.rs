//! Custom error types for the agent core
//!
//! Provides a unified error taxonomy across all modules. Provider failures are
//! classified here so the retry executor never has to inspect error strings.

use std::time::Duration;

use thiserror::Error;

/// Main error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid credentials (HTTP 401/403)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Malformed request rejected by the provider
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider throttling (HTTP 429)
    #[error("Rate limit error: {0}")]
    RateLimit(String),

    /// Transport failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Provider request exceeded its deadline
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Any other provider-side failure (5xx, undecodable body)
    #[error("Provider error: {0}")]
    Backend(String),

    /// A tool handler failed
    #[error("Tool '{tool}' execution failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The provider asked for a tool that is not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The tool loop hit its iteration cap without a plain response
    #[error("Tool loop exceeded {0} iterations without a final response")]
    ToolLoopExceeded(usize),

    /// Conversation store read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored record exists but cannot be decoded
    #[error("Corrupt record '{id}': {reason}")]
    CorruptRecord { id: String, reason: String },

    /// The caller's deadline for a whole send elapsed
    #[error("send_message timed out after {0:?}")]
    SendTimeout(Duration),

    /// A message violates a conversation invariant
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a request validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::RateLimit(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a provider timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a generic backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Map an HTTP status returned by a provider to an error kind.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Authentication(format!("HTTP {}: {}", status, body)),
            429 => Self::RateLimit(format!("HTTP {}: {}", status, body)),
            400 | 404 | 413 | 422 => Self::Validation(format!("HTTP {}: {}", status, body)),
            408 | 504 => Self::Timeout(format!("HTTP {}: {}", status, body)),
            _ => Self::Backend(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Whether the retry executor should try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit(_) | Self::Network(_) | Self::Timeout(_) | Self::Backend(_)
        )
    }

    /// Stable snake_case label for logs and span attributes
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::Validation(_) => "validation",
            Self::RateLimit(_) => "rate_limit",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Backend(_) => "backend",
            Self::ToolExecution { .. } => "tool_execution",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::ToolLoopExceeded(_) => "tool_loop_exceeded",
            Self::Persistence(_) => "persistence",
            Self::NotFound(_) => "not_found",
            Self::CorruptRecord { .. } => "corrupt_record",
            Self::SendTimeout(_) => "send_timeout",
            Self::InvalidMessage(_) => "invalid_message",
            Self::Config(_) => "config",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}
