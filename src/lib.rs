//! # Claude Conversation - Tool-Loop Orchestration for the Claude Messages API
//!
//! A conversational layer over the Claude messages API: fluent conversation building,
//! a multi-step tool execution loop, streaming, MCP servers and background jobs.
//!
//! ## Overview
//!
//! HTTP transport is not part of this crate. The API is any implementation of the
//! [`MessagesApi`] trait, injected as `Arc<dyn MessagesApi>`; tests use the
//! deterministic [`testing::FakeClient`].
//!
//! ## Key Features
//!
//! - **Tool Loop**: Execute requested tools and feed results back until the model answers
//! - **Local Tool Recovery**: Handler errors, panics and timeouts become `is_error` results
//! - **Streaming**: Text chunks pushed to a sink and to registered listeners
//! - **Structured Output**: JSON-schema constrained answers through a forced tool
//! - **MCP Servers**: Remote tool providers with SSRF-checked URLs and allow/deny policies
//! - **Prompt Caching**: Cacheable system prompts via [`CachedContent`]
//! - **Background Jobs**: Serializable single-call jobs with fixed-backoff retry and callbacks
//! - **Cost Estimation**: Usage priced per model from a configurable table
//!
//! ## Three Execution Modes
//!
//! ### 1. Synchronous tool loop (`send()`)
//!
//! ```rust,no_run
//! use claude_conversation::testing::FakeClient;
//! use claude_conversation::tool;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fake = Arc::new(FakeClient::new());
//!     let add = tool("add", "Add two numbers")
//!         .required_param("a", "number", "First operand")
//!         .required_param("b", "number", "Second operand")
//!         .build(|input| async move {
//!             let a = input["a"].as_f64().unwrap_or(0.0);
//!             let b = input["b"].as_f64().unwrap_or(0.0);
//!             Ok(serde_json::json!({"sum": a + b}))
//!         });
//!
//!     let mut conversation = fake.conversation();
//!     conversation.user("What is 2 + 3?").tools([add])?.max_steps(5)?;
//!
//!     let response = conversation.send().await?;
//!     println!("{}", response.full_text());
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Streaming (`stream()`)
//!
//! ```rust,no_run
//! use claude_conversation::testing::FakeClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fake = Arc::new(FakeClient::new());
//!     let mut conversation = fake.conversation();
//!     conversation.user("Tell me a story");
//!
//!     let complete = conversation.stream(|chunk| print!("{}", chunk.text)).await?;
//!     println!("\n[{:?}]", complete.stop_reason);
//!     Ok(())
//! }
//! ```
//!
//! ### 3. Background job (`dispatch()`)
//!
//! See [`job`] for callbacks and retry behavior.
//!
//! ## Architecture
//!
//! - **client**: `Client` entry point owning the config and the API
//! - **conversation**: `ConversationBuilder` and the tool loop
//! - **payload**: `ConversationConfig` snapshots and wire request assembly
//! - **executor**: per-response tool execution
//! - **tools**: tool definitions, builders and the registry
//! - **mcp**: MCP server descriptors and URL validation
//! - **streaming**: stream event reduction
//! - **events**: stream listeners
//! - **job**: background jobs and callbacks
//! - **config**: credentials, defaults, MCP and pricing tables
//! - **cost**: token cost estimation
//! - **retry**: backoff and retry classification
//! - **testing**: the fake API

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// The `MessagesApi` trait every API implementation provides.
mod api;

/// `Client`: validated configuration plus an injected API.
mod client;

/// Credentials, defaults, beta features, MCP server and pricing tables.
/// Environment variable support for `ANTHROPIC_*` and `CLAUDE_*` settings.
mod config;

/// The stateful conversation builder and its multi-step tool loop.
mod conversation;

/// Token cost estimation.
mod cost;

/// Error types and conversions used throughout the crate.
/// Defines the `Error` enum and `Result<T>` type alias.
mod error;

/// Listeners notified of stream chunks and completion.
mod events;

/// Runs the tool calls of one response and builds the follow-up messages.
mod executor;

/// MCP server descriptors with SSRF-safe URL validation.
mod mcp;

/// `ConversationConfig` snapshots and `MessageRequest` assembly.
mod payload;

/// Reduction of server-sent events into text chunks and a final aggregate.
mod streaming;

/// Tool definitions with JSON schema generation, and the tool registry.
mod tools;

/// Messages, content blocks, responses and stream events.
mod types;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

/// Background conversation jobs, callbacks and the callback registry.
pub mod job;

/// Retry utilities with exponential or fixed backoff.
/// Public so callers can wrap their own `send()` calls.
pub mod retry;

/// Fake API for tests: queued responses, recorded requests, assertions.
pub mod testing;

// --- Client & API ---

pub use api::{EventStream, MessagesApi};
pub use client::Client;

// --- Configuration ---

pub use config::{BetaFeatures, ClaudeConfig, DEFAULT_MODEL, McpServerConfig, ModelPricing};

// --- Conversations ---

pub use conversation::{ConversationBuilder, MIN_THINKING_BUDGET};
pub use cost::TokenCost;
pub use events::{ChunkListener, CompleteListener, EventListeners};
pub use payload::{
    ConversationConfig, DEFAULT_SCHEMA_TOOL, MessageRequest, PayloadBuilder, ThinkingConfig,
    ToolChoice, ToolSpec,
};
pub use streaming::{StreamHandler, StreamReducer};

// --- Error Handling ---

pub use error::{ApiErrorKind, Error, Result};

// --- Tools ---

pub use executor::ToolExecutor;
pub use mcp::{
    McpServer, McpServerDefinition, McpServerRef, McpToolset, ToolPolicy, ToolsetConfig,
    validate_url,
};
pub use tools::{
    Parameter, Tool, ToolBuilder, ToolDefinition, ToolHandler, ToolOutput, ToolRegistry,
    ToolValidator, Validation, tool,
};

// --- Core Types ---

pub use types::{
    CacheControl, CachedContent, ContentBlock, ContentDelta, DeltaUsage, DocumentBlock,
    ImageBlock, MediaSource, Message, MessageContent, MessageDeltaBody, MessageResponse,
    MessageRole, StopReason, StreamChunk, StreamComplete, StreamErrorBody, StreamEvent,
    SystemPrompt, TextBlock, ThinkingBlock, ToolResultBlock, ToolUseBlock, Usage,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use claude_conversation::prelude::*;` for typical usage.
///
/// This includes:
/// - Entry points: Client, ClaudeConfig, ConversationBuilder, MessagesApi
/// - Content: CachedContent, ContentBlock, Message, MessageResponse, StreamChunk
/// - Tools: Tool, tool(), Parameter, McpServer
/// - Errors: Error, Result
pub mod prelude {
    pub use crate::{
        CachedContent, ClaudeConfig, Client, ContentBlock, ConversationBuilder, Error,
        McpServer, Message, MessageResponse, MessagesApi, Parameter, Result, StopReason,
        StreamChunk, StreamComplete, Tool, tool,
    };
}
