//! Shared types used across modules
//!
//! Contains message structures, tool call/result records and the schema shape
//! advertised to providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open metadata map carried by messages, conversations and tool results
pub type Metadata = Map<String, Value>;

/// Metadata key holding the tool-call requests of an assistant message
pub const META_TOOL_CALLS: &str = "tool_calls";
/// Metadata key linking a tool message back to the request it answers
pub const META_TOOL_CALL_ID: &str = "tool_call_id";
/// Metadata key holding provider token usage
pub const META_USAGE: &str = "usage";

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message (may be empty when tool calls are present)
    pub content: String,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Tool-call requests, tool-call linkage, token usage
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Create a message with empty metadata
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        requests: Vec<ToolCallRequest>,
    ) -> Self {
        let mut message = Self::assistant(content);
        let requests = requests
            .into_iter()
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
            .collect();
        message
            .metadata
            .insert(META_TOOL_CALLS.to_string(), Value::Array(requests));
        message
    }

    /// Create a tool message carrying a tool result back to the provider
    pub fn tool_result(result: &ToolResult) -> Self {
        let mut message = Self::new(Role::Tool, result.content.clone());
        message.metadata.insert(
            META_TOOL_CALL_ID.to_string(),
            Value::String(result.tool_call_id.clone()),
        );
        if let Some(name) = result.tool_name() {
            message
                .metadata
                .insert("name".to_string(), Value::String(name.to_string()));
        }
        message
            .metadata
            .insert("success".to_string(), Value::Bool(result.success));
        message
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Tool-call requests carried by this message.
    ///
    /// Entries that do not decode as requests are skipped.
    pub fn tool_requests(&self) -> Vec<ToolCallRequest> {
        match self.metadata.get(META_TOOL_CALLS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the provider asked for tools in this message
    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests().is_empty()
    }

    /// Back-reference to the requesting tool call, for tool messages
    pub fn tool_call_id(&self) -> Option<&str> {
        self.metadata.get(META_TOOL_CALL_ID).and_then(|v| v.as_str())
    }

    /// Token usage reported by the provider, if any
    pub fn usage(&self) -> Option<TokenUsage> {
        self.metadata
            .get(META_USAGE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A tool call as requested by the provider, with unparsed arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Raw JSON argument text, opaque until parsed
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A tool call with parsed arguments, ready to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Parsed JSON arguments
    pub arguments: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            timestamp: Utc::now(),
        }
    }

    /// Parse a provider request. Blank argument text means no arguments.
    pub fn parse(request: &ToolCallRequest) -> std::result::Result<Self, String> {
        let raw = request.arguments.trim();
        if raw.is_empty() {
            return Ok(Self::new(&request.id, &request.name, Map::new()));
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(arguments)) => Ok(Self::new(&request.id, &request.name, arguments)),
            Ok(other) => Err(format!(
                "arguments for '{}' must be a JSON object, got {}",
                request.name,
                json_type_name(&other)
            )),
            Err(e) => Err(format!("arguments for '{}' are not valid JSON: {}", request.name, e)),
        }
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the tool call this answers
    pub tool_call_id: String,
    /// Stringified result or error description
    pub content: String,
    /// Whether the execution was successful
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::build(tool_call_id, tool_name, content, true)
    }

    /// Create a failed result; `kind` and `error` land in metadata
    pub fn failure(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        kind: &str,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let content = serde_json::json!({ "error": error }).to_string();
        let mut result = Self::build(tool_call_id, tool_name, content, false);
        result
            .metadata
            .insert("error".to_string(), Value::String(error));
        result
            .metadata
            .insert("error_kind".to_string(), Value::String(kind.to_string()));
        result
    }

    fn build(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        success: bool,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("tool_name".to_string(), Value::String(tool_name.into()));
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            success,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Name of the tool that produced this result
    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.get("tool_name").and_then(|v| v.as_str())
    }

    /// Error kind label for failed results
    pub fn error_kind(&self) -> Option<&str> {
        self.metadata.get("error_kind").and_then(|v| v.as_str())
    }
}

/// Tool schema advertised to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionSchema,
}

/// Function description within a tool schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: Value,
}

impl ToolSchema {
    /// Create a new function tool schema
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionSchema {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}
