//! Ollama Provider
//!
//! Async HTTP client for a local Ollama server's `/api/chat` endpoint.
//! Ollama returns tool arguments as JSON objects and may omit call ids, so both
//! are normalized into [`ToolCallRequest`]s here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::config::ProviderConfig;
use crate::core::{AgentError, Message, Result, Role, TokenUsage, ToolCallRequest, ToolSchema};
use crate::llm::traits::{Provider, ProviderCapabilities};

/// Ollama API client
#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    options: OllamaOptions,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Ollama tool call format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: OllamaFunction,
}

/// Ollama function in tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama chat response (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaProvider {
    /// Create a new Ollama client from configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Convert internal Message to Ollama format
    fn to_ollama_message(msg: &Message) -> OllamaMessage {
        let tool_calls = if msg.role == Role::Assistant {
            let calls: Vec<OllamaToolCall> = msg
                .tool_requests()
                .into_iter()
                .map(|r| OllamaToolCall {
                    function: OllamaFunction {
                        name: r.name,
                        arguments: serde_json::from_str(&r.arguments)
                            .unwrap_or_else(|_| Value::Object(Default::default())),
                    },
                    id: Some(r.id),
                })
                .collect();
            (!calls.is_empty()).then_some(calls)
        } else {
            None
        };

        OllamaMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            tool_calls,
        }
    }

    /// Convert Ollama response to an assistant message
    fn to_message(&self, response: ChatResponse) -> Message {
        let requests: Vec<ToolCallRequest> = response
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(n, tc)| {
                let arguments = match tc.function.arguments {
                    Value::String(raw) => raw,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                let id = tc.id.unwrap_or_else(|| format!("call_{}", n));
                ToolCallRequest::new(id, tc.function.name, arguments)
            })
            .collect();

        let mut message = if requests.is_empty() {
            Message::assistant(response.message.content)
        } else {
            Message::assistant_with_tool_calls(response.message.content, requests)
        };

        message = message
            .with_metadata("provider", Value::from(self.name()))
            .with_metadata(
                "model",
                Value::from(response.model.unwrap_or_else(|| self.model.clone())),
            );

        if let (Some(prompt), Some(completion)) = (response.prompt_eval_count, response.eval_count) {
            let usage = TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            };
            if let Ok(value) = serde_json::to_value(usage) {
                message = message.with_metadata("usage", value);
            }
        }

        message
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolSchema]>,
    ) -> Result<Message> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            tools: tools.filter(|t| !t.is_empty()),
            options: OllamaOptions {
                temperature,
                num_predict: max_tokens,
            },
            stream: false,
        };

        debug!(model = %self.model, messages = request.messages.len(), "ollama request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AgentError::network(format!(
                        "Cannot connect to Ollama at {}. Is it running?",
                        self.base_url
                    ))
                } else {
                    AgentError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status.as_u16(), error_text));
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AgentError::backend(format!("Undecodable Ollama response: {}", e)))?;

        Ok(self.to_message(parsed))
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_tools: true,
            supports_streaming: false,
            supports_vision: false,
            max_context_tokens: 32_768,
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
