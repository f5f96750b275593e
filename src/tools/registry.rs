//! Tool registry - manages and dispatches tool calls
//!
//! Central hub for registering tools and routing tool calls to handlers.
//! Execution never fails: unknown tools, handler errors and handler panics all
//! come back as failed [`ToolResult`]s the provider can read.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::{ToolCall, ToolResult, ToolSchema};
use crate::observability::{SpanContext, Tracer};

/// Async tool handler: parsed arguments in, JSON value out
pub type ToolHandler =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A named tool with its schema and handler
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
    handler: ToolHandler,
}

impl ToolDefinition {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| handler(args).boxed()),
        }
    }

    /// Schema in the provider's function-tool shape
    pub fn schema(&self) -> ToolSchema {
        ToolSchema::function(&self.name, &self.description, self.parameters.clone())
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Registry of available tools
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    /// Tool definitions indexed by name
    definitions: HashMap<String, ToolDefinition>,
    /// Names in registration order
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool definition. A second registration under the same name replaces the first.
    pub fn register(&mut self, definition: ToolDefinition) {
        let name = definition.name.clone();
        if self.definitions.insert(name.clone(), definition).is_some() {
            warn!(tool = %name, "tool re-registered, replacing previous definition");
        } else {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Get all tool definitions, in registration order
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.definitions.get(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Schemas to advertise to the provider, in registration order
    pub fn format_for_provider(&self) -> Vec<ToolSchema> {
        self.definitions().into_iter().map(ToolDefinition::schema).collect()
    }

    /// Execute a tool call
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(definition) = self.definitions.get(&call.name) else {
            warn!(tool = %call.name, "tool not found");
            return ToolResult {
                content: format!("Tool not found: {}", call.name),
                ..ToolResult::failure(&call.id, &call.name, "tool_not_found", "tool not found")
            };
        };

        debug!(tool = %call.name, call_id = %call.id, "executing tool");
        let outcome = AssertUnwindSafe((definition.handler)(call.arguments.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Value::String(text))) => ToolResult::success(&call.id, &call.name, text),
            Ok(Ok(value)) => ToolResult::success(&call.id, &call.name, value.to_string()),
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "tool handler failed");
                ToolResult::failure(&call.id, &call.name, "tool_execution", format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %call.name, panic = %message, "tool handler panicked");
                ToolResult::failure(
                    &call.id,
                    &call.name,
                    "tool_execution",
                    format!("tool panicked: {}", message),
                )
            }
        }
    }

    /// Execute a tool call inside a `tool.execute` span
    pub async fn execute_traced(&self, call: &ToolCall, tracer: &Tracer, parent: &SpanContext) -> ToolResult {
        let mut span = tracer.start_span("tool.execute", parent);
        span.set_attribute("tool.name", call.name.as_str());
        span.set_attribute("tool.call_id", call.id.as_str());

        let result = self.execute(call).await;

        span.set_attribute("tool.success", result.success);
        if let Some(kind) = result.error_kind() {
            span.set_attribute("error.kind", kind);
            let mut event = Map::new();
            event.insert("error.kind".to_string(), Value::from(kind));
            if let Some(message) = result.metadata.get("error") {
                event.insert("error.message".to_string(), message.clone());
            }
            span.add_event("tool.failed", event);
        }
        span.set_ok();
        span.end();
        result
    }

    /// Execute several calls; results come back in request order either way
    pub async fn execute_all(&self, calls: &[ToolCall], parallel: bool) -> Vec<ToolResult> {
        if parallel {
            join_all(calls.iter().map(|call| self.execute(call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute(call).await);
            }
            results
        }
    }

    /// [`execute_all`](Self::execute_all) with one span per call
    pub async fn execute_all_traced(
        &self,
        calls: &[ToolCall],
        parallel: bool,
        tracer: &Tracer,
        parent: &SpanContext,
    ) -> Vec<ToolResult> {
        if parallel {
            join_all(calls.iter().map(|call| self.execute_traced(call, tracer, parent))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute_traced(call, tracer, parent).await);
            }
            results
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Required string argument, or an error naming it
pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} is required", key))
}
