//! Configuration management for detective
//!
//! Supports a TOML config file, environment overrides and defaults.
//! Priority: CLI args > env vars > config file > defaults
//!
//! Config file location: ~/.config/detective/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{AgentError, Result};
use crate::core::retry::RetryConfig;

/// Main configuration for detective
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model backend selection and request parameters
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Orchestrator behavior
    #[serde(default)]
    pub agent: AgentSettings,
    /// Backoff for transient provider failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Context window budgeting
    #[serde(default)]
    pub context: ContextConfig,
    /// Where conversations and traces land
    #[serde(default)]
    pub storage: StorageConfig,
    /// Built-in tool wiring
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which provider implementation to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenRouter,
    Ollama,
    /// Deterministic in-process provider; mostly for tests and demos
    Scripted,
}

impl std::str::FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            "scripted" => Ok(Self::Scripted),
            other => Err(AgentError::config(format!("Unknown provider: {}", other))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
            Self::Scripted => "scripted",
        })
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Bearer token; required for OpenRouter
    pub api_key: Option<String>,
    /// Model identifier passed through to the backend
    pub model: String,
    /// Base URL of the backend API
    pub base_url: String,
    pub temperature: f32,
    /// Maximum tokens to generate per response
    pub max_tokens: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Sent as X-Title to OpenRouter
    pub app_name: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenRouter,
            api_key: None,
            model: "meta-llama/llama-3.3-70b-instruct:free".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 30,
            app_name: "detective".to_string(),
        }
    }
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Prompt sent first on every provider call
    pub system_prompt: String,
    /// Maximum provider turns per user message
    /// Default: 10
    pub max_tool_iterations: usize,
    /// Deadline for a whole send, in seconds
    pub send_timeout_secs: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful AI assistant.".to_string(),
            max_tool_iterations: 10,
            send_timeout_secs: None,
        }
    }
}

/// Context window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Explicit token budget; derived from provider capabilities when unset
    pub token_budget: Option<usize>,
    /// Fraction of the budget held back for estimation error
    pub safety_margin: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: None,
            safety_margin: 0.10,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub conversation_dir: PathBuf,
    pub trace_dir: PathBuf,
    /// Write JSONL traces; when false spans are only logged
    pub export_traces: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            conversation_dir: PathBuf::from("data/conversations"),
            trace_dir: PathBuf::from("data/traces"),
            export_traces: true,
        }
    }
}

/// Tool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// JSON file of releases keyed by id; release tools are off when unset
    pub releases_path: Option<PathBuf>,
    /// Directory for filed risk reports
    pub reports_dir: Option<PathBuf>,
    /// Run the tool calls of one turn concurrently
    pub parallel: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; RUST_LOG wins when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("detective")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration: .env, then file (explicit path or default location),
    /// then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Self::config_file();
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file only
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AgentError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AgentError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from a variable lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.is_empty()) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENROUTER_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("OPENROUTER_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(kind) = lookup("DETECTIVE_PROVIDER").and_then(|k| k.parse().ok()) {
            self.provider.kind = kind;
        }
        if let Some(prompt) = lookup("DETECTIVE_SYSTEM_PROMPT") {
            self.agent.system_prompt = prompt;
        }
        if let Some(dir) = lookup("DETECTIVE_CONVERSATION_DIR") {
            self.storage.conversation_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DETECTIVE_TRACE_DIR") {
            self.storage.trace_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("DETECTIVE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.provider;
        if !(0.0..=2.0).contains(&p.temperature) {
            return Err(AgentError::config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                p.temperature
            )));
        }
        if p.max_tokens == 0 {
            return Err(AgentError::config("max_tokens must be positive"));
        }
        if p.kind != ProviderKind::Scripted {
            url::Url::parse(&p.base_url).map_err(|e| {
                AgentError::config(format!("Invalid base_url '{}': {}", p.base_url, e))
            })?;
        }
        if !(0.0..1.0).contains(&self.context.safety_margin) {
            return Err(AgentError::config(format!(
                "safety_margin must be within [0, 1), got {}",
                self.context.safety_margin
            )));
        }
        if self.context.token_budget == Some(0) {
            return Err(AgentError::config("token_budget must be positive"));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(AgentError::config("max_tool_iterations must be at least 1"));
        }
        self.retry.validate()
    }

    /// Save configuration to the default location and return the path
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| AgentError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AgentError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| AgentError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.model, "meta-llama/llama-3.3-70b-instruct:free");
        assert_eq!(config.provider.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.provider.max_tokens, 4096);
        assert_eq!(config.agent.max_tool_iterations, 10);
        assert_eq!(config.agent.system_prompt, "You are a helpful AI assistant.");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [provider]
            kind = "ollama"
            model = "qwen3:8b"
            base_url = "http://localhost:11434"

            [context]
            token_budget = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.kind, ProviderKind::Ollama);
        assert_eq!(config.provider.temperature, 0.7);
        assert_eq!(config.context.token_budget, Some(2000));
        assert_eq!(config.context.safety_margin, 0.10);
        assert_eq!(config.storage.trace_dir, PathBuf::from("data/traces"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", "sk-test"),
            ("DETECTIVE_PROVIDER", "scripted"),
            ("DETECTIVE_TRACE_DIR", "/tmp/traces"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.provider.kind, ProviderKind::Scripted);
        assert_eq!(config.storage.trace_dir, PathBuf::from("/tmp/traces"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.provider.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.context.safety_margin = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.provider.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = Config::default_config_toml();
        assert!(toml_str.contains("[provider]"));
        assert!(toml_str.contains("max_tool_iterations"));
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("detective"));
    }
}
