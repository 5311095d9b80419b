//! Wire request assembly.
//!
//! [`ConversationConfig`] is the frozen, serializable snapshot of a conversation;
//! [`PayloadBuilder`] turns it into a [`MessageRequest`]. Building is a pure function
//! of the snapshot: optional fields the caller never set are left out of the request
//! entirely so the server applies its own defaults.
//!
//! ```text
//! ConversationConfig ──PayloadBuilder::build()──▶ MessageRequest
//!   model, max_tokens, messages          always present
//!   system                               string, or [text block] when cacheable
//!   temperature/top_k/top_p/stop_*       only when set
//!   metadata, service_tier               only when set
//!   thinking                             {type: enabled, budget_tokens}
//!   tools                                custom tools, schema tool, MCP toolsets
//!   tool_choice                          pinned to the schema tool
//!   mcp_servers                          one per MCP toolset
//! ```

use crate::mcp::{McpServerDefinition, McpToolset};
use crate::tools::ToolDefinition;
use crate::types::{Message, SystemPrompt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the synthetic tool used for structured output unless one is given.
pub const DEFAULT_SCHEMA_TOOL: &str = "structured_output";

const SCHEMA_TOOL_DESCRIPTION: &str = "Respond with structured data matching the provided schema";

/// Snapshot of everything needed to build a request.
///
/// Produced by `ConversationBuilder::to_config` and carried by background jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub model: String,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub service_tier: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerDefinition>,
    #[serde(default)]
    pub mcp_toolsets: Vec<McpToolset>,
    pub max_steps: u32,
    #[serde(default)]
    pub thinking_budget: Option<u32>,
    #[serde(default)]
    pub json_schema: Option<Value>,
    #[serde(default)]
    pub json_schema_name: Option<String>,
    /// Default per-tool timeout, in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl ConversationConfig {
    /// A config for `model` with the conversation defaults (1024 max tokens, one step).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages: Vec::new(),
            max_tokens: 1024,
            temperature: None,
            stop_sequences: Vec::new(),
            top_k: None,
            top_p: None,
            metadata: None,
            service_tier: None,
            tools: Vec::new(),
            mcp_servers: Vec::new(),
            mcp_toolsets: Vec::new(),
            max_steps: 1,
            thinking_budget: None,
            json_schema: None,
            json_schema_name: None,
            timeout: None,
        }
    }
}

// ============================================================================
// WIRE REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Enabled { budget_tokens: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    Tool { name: String },
}

/// Entry of the request's `tools` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolSpec {
    McpToolset(McpToolset),
    Custom(ToolDefinition),
}

impl ToolSpec {
    /// Name of a custom tool, `None` for MCP toolsets
    pub fn name(&self) -> Option<&str> {
        match self {
            ToolSpec::Custom(def) => Some(&def.name),
            ToolSpec::McpToolset(_) => None,
        }
    }
}

/// The request body sent to the messages endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Vec<McpServerDefinition>>,
}

impl MessageRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            messages,
            system: None,
            temperature: None,
            top_k: None,
            top_p: None,
            stop_sequences: None,
            metadata: None,
            service_tier: None,
            thinking: None,
            tools: None,
            tool_choice: None,
            mcp_servers: None,
        }
    }

    /// Text of the last user message sent as plain text or a text block
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::MessageRole::User)
            .and_then(Message::text)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builds [`MessageRequest`]s from a [`ConversationConfig`].
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    config: ConversationConfig,
}

impl PayloadBuilder {
    pub fn from_config(config: ConversationConfig) -> Self {
        Self { config }
    }

    /// Replace the message history, used between tool loop steps.
    pub fn set_messages(&mut self, messages: Vec<Message>) -> &mut Self {
        self.config.messages = messages;
        self
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn build(&self) -> MessageRequest {
        let mut request = MessageRequest::new(
            &self.config.model,
            self.config.max_tokens,
            self.config.messages.clone(),
        );

        request.system = self.config.system.clone();
        self.add_sampling_parameters(&mut request);
        self.add_metadata(&mut request);
        self.add_thinking(&mut request);
        self.add_tools(&mut request);

        request
    }

    fn add_sampling_parameters(&self, request: &mut MessageRequest) {
        request.temperature = self.config.temperature;
        request.top_k = self.config.top_k;
        request.top_p = self.config.top_p;
        if !self.config.stop_sequences.is_empty() {
            request.stop_sequences = Some(self.config.stop_sequences.clone());
        }
    }

    fn add_metadata(&self, request: &mut MessageRequest) {
        request.metadata = self.config.metadata.clone();
        request.service_tier = self.config.service_tier.clone();
    }

    fn add_thinking(&self, request: &mut MessageRequest) {
        request.thinking = self
            .config
            .thinking_budget
            .map(|budget_tokens| ThinkingConfig::Enabled { budget_tokens });
    }

    fn add_tools(&self, request: &mut MessageRequest) {
        let mut tools: Vec<ToolSpec> = self
            .config
            .tools
            .iter()
            .cloned()
            .map(ToolSpec::Custom)
            .collect();

        if let Some(schema) = &self.config.json_schema {
            let name = self
                .config
                .json_schema_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SCHEMA_TOOL.to_string());
            tools.push(ToolSpec::Custom(ToolDefinition {
                name: name.clone(),
                description: Some(SCHEMA_TOOL_DESCRIPTION.to_string()),
                input_schema: schema.clone(),
            }));
            request.tool_choice = Some(ToolChoice::Tool { name });
        }

        // Servers and toolsets only travel together
        if !self.config.mcp_servers.is_empty() {
            request.mcp_servers = Some(self.config.mcp_servers.clone());
            tools.extend(
                self.config
                    .mcp_toolsets
                    .iter()
                    .cloned()
                    .map(ToolSpec::McpToolset),
            );
        }

        if !tools.is_empty() {
            request.tools = Some(tools);
        }
    }
}
