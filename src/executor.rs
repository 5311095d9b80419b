//! Tool execution for one model response.
//!
//! [`ToolExecutor`] runs every `tool_use` block of a response, in order, and returns
//! exactly one [`ToolResultBlock`] per block. Failures never escape: a missing tool,
//! refused input, handler error, panic or timeout each become an `is_error` result so
//! the remaining calls still run and the model gets a chance to react.
//!
//! ```text
//! tool_use block
//!   │ lookup by name ───────── missing / no handler ──▶ error result
//!   │ required params + validator ── refused ─────────▶ error result
//!   │ handler under deadline ── Err / panic / timeout ─▶ error result
//!   ▼
//! content: text as-is, anything else JSON-encoded ──────▶ success result
//! ```
//!
//! Timeouts use [`tokio::time::timeout`], so handlers must be cooperative: a handler
//! that blocks the thread without reaching an `.await` cannot be interrupted.

use crate::tools::{Tool, ToolRegistry, ToolOutput};
use crate::types::{ContentBlock, Message, MessageResponse, TextBlock, ToolResultBlock, ToolUseBlock};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Runs tool calls requested by the model.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    tools: ToolRegistry,
    default_timeout: Option<Duration>,
}

impl ToolExecutor {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            default_timeout: None,
        }
    }

    /// Deadline applied to tools that do not declare their own
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn set_tools(&mut self, tools: ToolRegistry) -> &mut Self {
        self.tools = tools;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// True if any tool_use block names a registered tool with a handler.
    pub fn has_executable_tools(&self, response: &MessageResponse) -> bool {
        response
            .tool_uses()
            .any(|block| self.tools.executable(&block.name).is_some())
    }

    /// Execute every tool_use block of `response`, one result per block, in order.
    pub async fn execute_tools_from_response(
        &self,
        response: &MessageResponse,
    ) -> Vec<ToolResultBlock> {
        let mut results = Vec::new();
        for block in response.tool_uses() {
            results.push(self.execute_tool_block(block).await);
        }
        results
    }

    /// Execute a single tool_use block.
    pub async fn execute_tool_block(&self, block: &ToolUseBlock) -> ToolResultBlock {
        let Some(tool) = self.tools.executable(&block.name) else {
            log::warn!("Tool not found or has no handler: {}", block.name);
            return ToolResultBlock::error(
                &block.id,
                format!("Tool '{}' not found or has no handler", block.name),
            );
        };

        // Non-object input is treated as an empty object
        let input = match &block.input {
            Value::Object(_) => block.input.clone(),
            _ => Value::Object(Map::new()),
        };

        if let Err(message) = tool.check_input(&input) {
            log::warn!("Tool input rejected: {}: {}", block.name, message);
            return ToolResultBlock::error(&block.id, format!("Error: {message}"));
        }

        let output = match self.run_handler(tool, input).await {
            Ok(output) => output,
            Err(message) => {
                log::error!("Tool execution failed: {}: {}", block.name, message);
                return ToolResultBlock::error(&block.id, format!("Error: {message}"));
            }
        };

        match output.into_content() {
            Ok(content) => ToolResultBlock::success(&block.id, content),
            Err(err) => {
                log::error!("Tool result JSON encoding failed: {}: {}", block.name, err);
                ToolResultBlock::error(&block.id, "Error: Tool result could not be encoded as JSON")
            }
        }
    }

    /// Run the handler under its deadline, catching panics.
    async fn run_handler(&self, tool: &Tool, input: Value) -> Result<ToolOutput, String> {
        let call = AssertUnwindSafe(tool.execute(input)).catch_unwind();

        let outcome = match tool.timeout().or(self.default_timeout) {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(format!("Tool '{}' execution timed out", tool.name()));
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(err.to_string()),
            Err(panic) => Err(panic_message(panic.as_ref())),
        }
    }

    /// The assistant echo and the user tool_result message for one step.
    ///
    /// The assistant message keeps the text and tool_use blocks exactly as received.
    pub fn build_tool_interaction_messages(
        &self,
        response: &MessageResponse,
        results: Vec<ToolResultBlock>,
    ) -> [Message; 2] {
        let echoed = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(ContentBlock::Text(TextBlock::new(&text.text))),
                ContentBlock::ToolUse(tool_use) => Some(ContentBlock::ToolUse(tool_use.clone())),
                _ => None,
            })
            .collect();

        [
            Message::assistant_blocks(echoed),
            Message::user_blocks(results.into_iter().map(ContentBlock::ToolResult).collect()),
        ]
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Tool panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Tool panicked: {message}")
    } else {
        "Tool panicked".to_string()
    }
}
