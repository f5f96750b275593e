//! Agent orchestrator
//!
//! Main agent that coordinates the provider, tools, context window and store.
//! Each user message runs a bounded tool loop: call the provider, run any
//! requested tools, feed their results back, until a plain reply arrives.
//!
//! The loop works on a copy of the conversation. The copy replaces the agent's
//! conversation only after it has been saved, so a failed or cancelled send
//! leaves the agent exactly as it was.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::agent::context::{ContextSelection, ContextWindowManager};
use crate::agent::conversation::Conversation;
use crate::agent::loop_state::{AgentState, LoopState};
use crate::core::retry::{RetryConfig, RetryExecutor, Sleeper, TokioSleeper};
use crate::core::{AgentError, Config, Message, Result, ToolCall, ToolResult};
use crate::llm::{create_provider, Provider};
use crate::observability::{ActiveSpan, JsonlTraceExporter, SpanKind, Tracer};
use crate::store::{ConversationStore, FileConversationStore, MemoryConversationStore};
use crate::tools::{register_release_tools, ToolRegistry};

/// Runtime knobs for an agent
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub system_prompt: String,
    /// Provider turns allowed per user message
    pub max_tool_iterations: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Context budget; derived from provider capabilities when `None`
    pub token_budget: Option<usize>,
    pub safety_margin: f64,
    pub retry: RetryConfig,
    /// Run the tool calls of one turn concurrently
    pub parallel_tools: bool,
    /// Deadline applied by [`Agent::send_message`]
    pub send_timeout: Option<Duration>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AgentOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: config.agent.system_prompt.clone(),
            max_tool_iterations: config.agent.max_tool_iterations,
            temperature: config.provider.temperature,
            max_tokens: config.provider.max_tokens,
            token_budget: config.context.token_budget,
            safety_margin: config.context.safety_margin,
            retry: config.retry.clone(),
            parallel_tools: config.tools.parallel,
            send_timeout: config.agent.send_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Main agent that orchestrates the provider and tools
pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    tracer: Tracer,
    retry: RetryExecutor,
    context: ContextWindowManager,
    options: AgentOptions,
    /// Last committed conversation
    conversation: Conversation,
    state: AgentState,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Wire up an agent from configuration: provider, release tools,
    /// file store and JSONL traces.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.provider)?;

        let mut tools = ToolRegistry::new();
        if let Some(releases) = &config.tools.releases_path {
            register_release_tools(&mut tools, releases.clone(), config.tools.reports_dir.clone());
        }

        let tracer = if config.storage.export_traces {
            Tracer::new(Arc::new(JsonlTraceExporter::new(&config.storage.trace_dir)))
        } else {
            Tracer::noop()
        };

        AgentBuilder::new()
            .provider(provider)
            .tools(tools)
            .store(Arc::new(FileConversationStore::new(&config.storage.conversation_dir)))
            .tracer(tracer)
            .settings(AgentOptions::from_config(config))
            .build()
    }

    /// Send a user message and return the final assistant reply.
    ///
    /// Applies the configured send timeout, if any.
    pub async fn send_message(&mut self, text: &str) -> Result<String> {
        match self.options.send_timeout {
            Some(limit) => self.send_message_with_timeout(text, limit).await,
            None => self.send(text).await,
        }
    }

    /// Send with an explicit deadline for the whole exchange
    pub async fn send_message_with_timeout(&mut self, text: &str, limit: Duration) -> Result<String> {
        match tokio::time::timeout(limit, self.send(text)).await {
            Ok(result) => result,
            Err(_) => {
                self.state = AgentState::Idle;
                warn!(conversation = %self.conversation.id, ?limit, "send timed out");
                Err(AgentError::SendTimeout(limit))
            }
        }
    }

    async fn send(&mut self, text: &str) -> Result<String> {
        let mut working = self.conversation.clone();
        let mut root = self
            .tracer
            .start_trace("agent.send_message", &working.trace_id());
        root.set_attribute("conversation.id", working.id.as_str());

        let outcome = match self.run_loop(&mut working, text, &root).await {
            Ok(reply) => self.persist(&working, &root).await.map(|_| reply),
            Err(e) => Err(e),
        };
        self.state = AgentState::Idle;

        match outcome {
            Ok(reply) => {
                root.set_attribute("messages", working.len());
                root.set_ok();
                root.end();
                self.conversation = working;
                Ok(reply)
            }
            Err(e) => {
                warn!(conversation = %self.conversation.id, kind = e.kind(), error = %e, "send failed");
                root.record_error(&e);
                root.end();
                Err(e)
            }
        }
    }

    async fn run_loop(&mut self, working: &mut Conversation, text: &str, root: &ActiveSpan) -> Result<String> {
        working.push(Message::user(text))?;

        let mut loop_state = LoopState::new(self.options.max_tool_iterations);
        let capabilities = self.provider.capabilities();
        let schemas = (capabilities.supports_tools && !self.tools.is_empty())
            .then(|| self.tools.format_for_provider());
        let budget = self.token_budget();

        while loop_state.can_continue() {
            let iteration = loop_state.next_iteration();
            self.state = loop_state.state();

            let mut iter_span = root.child("agent.iteration");
            iter_span.set_attribute("iteration", iteration);

            let selection = self.select_context(working, budget, &iter_span);

            let reply = match self.call_provider(&selection, schemas.as_deref(), &iter_span).await {
                Ok(reply) => reply,
                Err(e) => {
                    iter_span.record_error(&e);
                    iter_span.end();
                    return Err(e);
                }
            };

            let requests = reply.tool_requests();
            let content = reply.content.clone();
            working.push(reply)?;

            if requests.is_empty() {
                iter_span.set_attribute("tool_calls", 0);
                iter_span.set_ok();
                iter_span.end();
                loop_state.transition(AgentState::Idle);
                info!(
                    conversation = %working.id,
                    iterations = iteration,
                    tool_calls = loop_state.tool_calls,
                    "turn complete"
                );
                return Ok(content);
            }

            loop_state.transition(AgentState::ExecutingTools);
            self.state = loop_state.state();
            loop_state.record_tools(requests.len());
            iter_span.set_attribute("tool_calls", requests.len());

            // Parse failures become failed results in place; the rest execute.
            let mut calls = Vec::new();
            let mut slots: Vec<Option<ToolResult>> = Vec::with_capacity(requests.len());
            for request in &requests {
                match ToolCall::parse(request) {
                    Ok(call) => {
                        calls.push(call);
                        slots.push(None);
                    }
                    Err(reason) => {
                        warn!(tool = %request.name, %reason, "invalid tool arguments");
                        let mut span = iter_span.child("tool.execute");
                        span.set_attribute("tool.name", request.name.as_str());
                        span.set_attribute("tool.call_id", request.id.as_str());
                        span.set_attribute("tool.success", false);
                        span.set_attribute("error.kind", "invalid_arguments");
                        span.set_ok();
                        span.end();
                        slots.push(Some(ToolResult::failure(
                            &request.id,
                            &request.name,
                            "invalid_arguments",
                            reason,
                        )));
                    }
                }
            }

            let mut executed = self
                .tools
                .execute_all_traced(&calls, self.options.parallel_tools, &self.tracer, &iter_span.context())
                .await
                .into_iter();

            for slot in slots {
                let result = match slot {
                    Some(result) => result,
                    None => executed
                        .next()
                        .ok_or_else(|| AgentError::Other("missing tool result".to_string()))?,
                };
                working.push(Message::tool_result(&result))?;
            }

            iter_span.set_ok();
            iter_span.end();
        }

        Err(AgentError::ToolLoopExceeded(self.options.max_tool_iterations))
    }

    fn select_context(&self, working: &Conversation, budget: usize, parent: &ActiveSpan) -> ContextSelection {
        let mut span = parent.child("context.select");
        let selection = self.context.select(
            &working.system_message(),
            working.messages(),
            budget,
            |messages| self.provider.estimate_tokens(messages),
        );

        span.set_attribute("budget", selection.budget);
        span.set_attribute("limit", selection.limit);
        span.set_attribute("tokens_used", selection.tokens_used);
        span.set_attribute("messages", selection.messages.len());
        span.set_attribute("dropped", selection.dropped);
        span.set_attribute("overflowed", selection.overflowed);
        if selection.overflowed {
            warn!(
                tokens = selection.tokens_used,
                limit = selection.limit,
                "latest message exceeds the context budget on its own"
            );
        }
        span.set_ok();
        span.end();
        selection
    }

    async fn call_provider(
        &self,
        selection: &ContextSelection,
        schemas: Option<&[crate::core::ToolSchema]>,
        parent: &ActiveSpan,
    ) -> Result<Message> {
        let mut span = parent.child("provider.complete");
        span.set_kind(SpanKind::Client);
        span.set_attribute("provider", self.provider.name());
        span.set_attribute("model", self.provider.model());
        span.set_attribute("messages", selection.messages.len());
        span.set_attribute("tools", schemas.map(|s| s.len()).unwrap_or(0));

        let messages = &selection.messages;
        let result = self
            .retry
            .execute("provider.complete", &span.context(), || {
                self.provider.complete(
                    messages,
                    self.options.temperature,
                    self.options.max_tokens,
                    schemas,
                )
            })
            .await;

        match &result {
            Ok(reply) => {
                if let Some(usage) = reply.usage() {
                    span.set_attribute("usage.prompt_tokens", usage.prompt_tokens);
                    span.set_attribute("usage.completion_tokens", usage.completion_tokens);
                }
                span.set_attribute("tool_calls", reply.tool_requests().len());
                span.set_ok();
            }
            Err(e) => span.record_error(e),
        }
        span.end();
        result
    }

    async fn persist(&self, working: &Conversation, root: &ActiveSpan) -> Result<()> {
        let mut span = root.child("conversation.save");
        span.set_attribute("conversation.id", working.id.as_str());
        match self.store.save(working).await {
            Ok(()) => {
                span.set_ok();
                span.end();
                Ok(())
            }
            Err(e) => {
                span.record_error(&e);
                span.end();
                Err(e)
            }
        }
    }

    /// Budget handed to the context window manager
    pub fn token_budget(&self) -> usize {
        self.options.token_budget.unwrap_or_else(|| {
            self.provider
                .capabilities()
                .max_context_tokens
                .saturating_sub(self.options.max_tokens as usize)
        })
        .max(1)
    }

    /// Start a fresh conversation; the old one stays in the store
    pub fn new_conversation(&mut self) -> &Conversation {
        self.conversation = Conversation::new(self.options.system_prompt.clone());
        self.state = AgentState::Idle;
        &self.conversation
    }

    /// Replace the active conversation with a stored one
    pub async fn resume(&mut self, id: &str) -> Result<&Conversation> {
        let conversation = self.store.load(id).await?;
        info!(conversation = %conversation.id, messages = conversation.len(), "conversation resumed");
        self.conversation = conversation;
        self.state = AgentState::Idle;
        Ok(&self.conversation)
    }

    /// Ids of stored conversations
    pub async fn list_conversations(&self) -> Result<Vec<String>> {
        self.store.list().await
    }

    /// The last `limit` messages, or all of them
    pub fn history(&self, limit: Option<usize>) -> &[Message] {
        match limit {
            Some(n) => self.conversation.last_n(n),
            None => self.conversation.messages(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.names())
            .field("conversation", &self.conversation.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Builder for creating agents
pub struct AgentBuilder {
    provider: Option<Arc<dyn Provider>>,
    tools: Arc<ToolRegistry>,
    store: Option<Arc<dyn ConversationStore>>,
    tracer: Tracer,
    sleeper: Arc<dyn Sleeper>,
    options: AgentOptions,
    conversation: Option<Conversation>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: Arc::new(ToolRegistry::new()),
            store: None,
            tracer: Tracer::noop(),
            sleeper: Arc::new(TokioSleeper),
            options: AgentOptions::default(),
            conversation: None,
        }
    }

    /// Set the provider (required)
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the tool registry
    pub fn tools(mut self, tools: impl Into<Arc<ToolRegistry>>) -> Self {
        self.tools = tools.into();
        self
    }

    /// Set the conversation store; defaults to an in-memory store
    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Set what the retry executor sleeps on
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    /// Start from an existing conversation instead of a fresh one
    pub fn conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = Some(conversation);
        self
    }

    /// Build the Agent
    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::config("agent requires a provider"))?;
        if self.options.max_tool_iterations == 0 {
            return Err(AgentError::config("max_tool_iterations must be at least 1"));
        }
        self.options.retry.validate()?;

        let retry = RetryExecutor::new(self.options.retry.clone(), self.tracer.clone())
            .with_sleeper(self.sleeper);
        let conversation = self
            .conversation
            .unwrap_or_else(|| Conversation::new(self.options.system_prompt.clone()));

        Ok(Agent {
            provider,
            tools: self.tools,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryConversationStore::new())),
            tracer: self.tracer,
            retry,
            context: ContextWindowManager::new(self.options.safety_margin),
            options: self.options,
            conversation,
            state: AgentState::Idle,
        })
    }
}
