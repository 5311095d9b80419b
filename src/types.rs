//! Core type definitions for messages, content blocks, responses and stream events.
//!
//! These mirror the Claude messages API wire format closely enough to drive the
//! conversation loop. Everything here derives `Serialize`/`Deserialize` so a frozen
//! conversation can be shipped to a background worker and rebuilt unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// MESSAGES
// ============================================================================

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Message content: either a bare string or an ordered list of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: MessageRole, content: MessageContent) -> Self {
        Self { role, content }
    }

    /// User message with plain text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, MessageContent::Text(text.into()))
    }

    /// Assistant message with plain text content
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, MessageContent::Text(text.into()))
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::User, MessageContent::Blocks(blocks))
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, MessageContent::Blocks(blocks))
    }

    /// The plain text content, or the first text block's text
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(blocks) => blocks.iter().find_map(ContentBlock::as_text),
        }
    }
}

// ============================================================================
// CONTENT BLOCKS
// ============================================================================

/// Content block tagged by its `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    Document(DocumentBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Thinking(ThinkingBlock),
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(block) => Some(&block.text),
            _ => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUseBlock> {
        match self {
            ContentBlock::ToolUse(block) => Some(block),
            _ => None,
        }
    }
}

/// Cache hint attached to a text block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache_control: None,
        }
    }
}

/// Where an image or document comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub source: MediaSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBlock {
    pub source: MediaSource,
}

/// A model request to invoke a named tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Outcome of one tool invocation, fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolResultBlock {
    pub fn success(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    pub thinking: String,
    #[serde(default)]
    pub signature: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// SYSTEM PROMPTS
// ============================================================================

/// Text flagged for server-side prompt caching.
///
/// The cache type defaults to `ephemeral`.
///
/// ```rust
/// use claude_conversation::CachedContent;
///
/// let docs = CachedContent::make("Long reference documentation");
/// assert_eq!(docs.cache_type(), "ephemeral");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedContent {
    content: String,
    cache_type: String,
}

impl CachedContent {
    pub fn make(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            cache_type: "ephemeral".to_string(),
        }
    }

    /// Override the cache type
    pub fn cache(mut self, kind: impl Into<String>) -> Self {
        self.cache_type = kind.into();
        self
    }

    pub fn ephemeral(self) -> Self {
        self.cache("ephemeral")
    }

    pub fn cache_type(&self) -> &str {
        &self.cache_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// The `{type: text, text, cache_control}` block sent on the wire
    pub fn to_block(&self) -> ContentBlock {
        ContentBlock::Text(TextBlock {
            text: self.content.clone(),
            cache_control: Some(CacheControl {
                kind: self.cache_type.clone(),
            }),
        })
    }
}

/// System prompt as sent on the wire: a bare string, or content blocks when cacheable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for SystemPrompt {
    fn from(text: String) -> Self {
        SystemPrompt::Text(text)
    }
}

impl From<&str> for SystemPrompt {
    fn from(text: &str) -> Self {
        SystemPrompt::Text(text.to_string())
    }
}

impl From<CachedContent> for SystemPrompt {
    fn from(content: CachedContent) -> Self {
        SystemPrompt::Blocks(vec![content.to_block()])
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    PauseTurn,
    Refusal,
}

/// Token accounting for one response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Self::default()
        }
    }
}

/// A complete model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub role: MessageRole,
    pub model: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessageResponse {
    /// Text of the first text block
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }

    /// Concatenation of every text block
    pub fn full_text(&self) -> String {
        self.content.iter().filter_map(ContentBlock::as_text).collect()
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.content.iter().filter_map(ContentBlock::as_tool_use)
    }

    pub fn wants_tools(&self) -> bool {
        self.stop_reason == Some(StopReason::ToolUse)
    }

    /// Input of the first tool_use block, which carries schema-constrained output
    pub fn structured_output(&self) -> Option<&Value> {
        self.tool_uses().next().map(|block| &block.input)
    }
}

// ============================================================================
// STREAMING
// ============================================================================

/// One piece of streamed text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub text: String,
    pub index: usize,
    #[serde(rename = "type")]
    pub chunk_type: String,
}

impl StreamChunk {
    pub fn new(text: impl Into<String>, index: usize) -> Self {
        Self {
            text: text.into(),
            index,
            chunk_type: "text_delta".to_string(),
        }
    }
}

/// Aggregate produced once a stream ends
#[derive(Debug, Clone, PartialEq)]
pub struct StreamComplete {
    pub message: Option<MessageResponse>,
    pub full_text: String,
    pub stop_reason: Option<StopReason>,
}

impl StreamComplete {
    /// Token usage of the final message, zero when none was captured
    pub fn usage(&self) -> Usage {
        self.message
            .as_ref()
            .map(|message| message.usage)
            .unwrap_or_default()
    }
}

/// Server-sent events of the messages stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageResponse,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamErrorBody,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaUsage {
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
