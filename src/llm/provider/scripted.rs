//! Scripted Provider
//!
//! Deterministic in-process provider. Replies come from a queue and every
//! request is recorded, which makes orchestration testable without a backend.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, Message, Result, Role, ToolCallRequest, ToolSchema};
use crate::llm::traits::{Provider, ProviderCapabilities};

enum Step {
    Reply(Message),
    Fail(AgentError),
}

/// A request as the provider saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_count: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Provider that plays back a fixed script
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
    capabilities: ProviderCapabilities,
    delay: Option<Duration>,
    echo: bool,
    next_call_id: Mutex<usize>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            capabilities: ProviderCapabilities::default(),
            delay: None,
            echo: false,
            next_call_id: Mutex::new(1),
        }
    }

    /// Once the script runs out, answer with the last user message instead of failing
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    /// Queue a plain text reply
    pub fn respond(self, text: impl Into<String>) -> Self {
        self.push(Step::Reply(Message::assistant(text)))
    }

    /// Queue a reply requesting tools, given as `(name, raw arguments)` pairs
    pub fn respond_with_tools(self, calls: &[(&str, &str)]) -> Self {
        let requests = calls
            .iter()
            .map(|(name, args)| ToolCallRequest::new(self.next_id(), *name, *args))
            .collect();
        self.push(Step::Reply(Message::assistant_with_tool_calls("", requests)))
    }

    /// Queue a ready-made assistant message
    pub fn respond_with(self, message: Message) -> Self {
        self.push(Step::Reply(message))
    }

    /// Queue a failure
    pub fn fail(self, error: AgentError) -> Self {
        self.push(Step::Fail(error))
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Wait this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Steps not yet consumed
    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or_default()
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self
    }

    fn next_id(&self) -> String {
        match self.next_call_id.lock() {
            Ok(mut n) => {
                let id = format!("call_{}", *n);
                *n += 1;
                id
            }
            Err(_) => "call_0".to_string(),
        }
    }

    fn next_step(&self) -> Option<Step> {
        self.steps.lock().ok().and_then(|mut s| s.pop_front())
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolSchema]>,
    ) -> Result<Message> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tool_count: tools.map(|t| t.len()).unwrap_or(0),
                temperature,
                max_tokens,
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let message = match self.next_step() {
            Some(Step::Reply(message)) => message,
            Some(Step::Fail(error)) => return Err(error),
            None if self.echo => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                Message::assistant(format!("echo: {}", last_user))
            }
            None => return Err(AgentError::validation("scripted provider has no more responses")),
        };

        Ok(message
            .with_metadata("provider", Value::from(self.name()))
            .with_metadata("model", Value::from(self.model())))
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
