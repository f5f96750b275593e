//! OpenRouter Provider
//!
//! OpenAI-compatible chat completions over HTTPS with bearer auth.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::config::ProviderConfig;
use crate::core::{AgentError, Message, Result, Role, ToolCallRequest, ToolSchema, TokenUsage};
use crate::llm::traits::{Provider, ProviderCapabilities};

const REFERER: &str = "https://github.com/detective-agent/detective";

/// OpenRouter API client
#[derive(Clone)]
pub struct OpenRouterProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    app_name: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

impl OpenRouterProvider {
    /// Create a provider from configuration. An API key is required.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::config("OPENROUTER_API_KEY is not set"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AgentError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            app_name: config.app_name.clone(),
        })
    }

    fn to_wire_message(msg: &Message) -> WireMessage {
        let mut wire = WireMessage {
            role: msg.role.as_str().to_string(),
            content: Some(msg.content.clone()),
            tool_calls: None,
            tool_call_id: None,
        };

        match msg.role {
            Role::Assistant => {
                let requests = msg.tool_requests();
                if !requests.is_empty() {
                    wire.tool_calls = Some(
                        requests
                            .into_iter()
                            .map(|r| WireToolCall {
                                id: r.id,
                                call_type: function_type(),
                                function: WireFunction {
                                    name: r.name,
                                    arguments: r.arguments,
                                },
                            })
                            .collect(),
                    );
                    if msg.content.is_empty() {
                        wire.content = None;
                    }
                }
            }
            Role::Tool => {
                wire.tool_call_id = msg.tool_call_id().map(str::to_string);
            }
            _ => {}
        }

        wire
    }

    fn to_message(&self, response: ChatResponse) -> Result<Message> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::backend("response contained no choices"))?;

        let requests: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let content = choice.message.content.unwrap_or_default();
        let mut message = if requests.is_empty() {
            Message::assistant(content)
        } else {
            Message::assistant_with_tool_calls(content, requests)
        };

        message = message
            .with_metadata("provider", Value::from(self.name()))
            .with_metadata(
                "model",
                Value::from(response.model.unwrap_or_else(|| self.model.clone())),
            );
        if let Some(usage) = response.usage {
            message = message.with_metadata("usage", serde_json::to_value(usage)?);
        }
        Ok(message)
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolSchema]>,
    ) -> Result<Message> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(Self::to_wire_message).collect(),
            temperature,
            max_tokens,
            tools: tools.filter(|t| !t.is_empty()),
            stream: false,
        };

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.map(|t| t.len()).unwrap_or(0),
            "openrouter request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", &self.app_name)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::from_status(status.as_u16(), body));
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AgentError::backend(format!("Undecodable response: {}", e)))?;

        self.to_message(parsed)
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_tools: true,
            supports_streaming: false,
            supports_vision: false,
            max_context_tokens: 128_000,
        }
    }

    fn name(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
