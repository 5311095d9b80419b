//! Deterministic test double for the messages API.
//!
//! [`FakeClient`] implements [`MessagesApi`] from a queue of canned
//! [`FakeResponse`]s and records every request it receives, so tests can drive
//! conversations, tool loops, streams and background jobs without a network and then
//! assert on what would have been sent.
//!
//! There is no global registry: hand the fake to whatever needs an API.
//!
//! ```rust
//! use claude_conversation::testing::{FakeClient, FakeResponse};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let fake = Arc::new(FakeClient::new().respond_with([FakeResponse::make("Paris")]));
//!
//! let mut conversation = fake.conversation();
//! conversation.user("Capital of France?");
//! let response = conversation.send().await?;
//!
//! assert_eq!(response.text(), Some("Paris"));
//! fake.assert_sent(|request| request.last_user_text() == Some("Capital of France?"));
//! # Ok::<(), claude_conversation::Error>(())
//! # }).unwrap();
//! ```

use crate::api::{EventStream, MessagesApi};
use crate::config::{ClaudeConfig, DEFAULT_MODEL};
use crate::conversation::ConversationBuilder;
use crate::payload::MessageRequest;
use crate::types::{
    ContentBlock, ContentDelta, DeltaUsage, MessageDeltaBody, MessageResponse, MessageRole,
    StopReason, StreamEvent, TextBlock, ToolUseBlock, Usage,
};
use crate::{ApiErrorKind, Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Characters per streamed text delta unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 20;

const FALLBACK_TEXT: &str = "Fake response";

fn fake_id(prefix: &str) -> String {
    format!("{prefix}{:016x}", rand::random::<u64>())
}

// ============================================================================
// RESPONSES
// ============================================================================

/// A canned model response.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeResponse {
    text: String,
    tool_use: Option<(String, Value)>,
    stop_reason: StopReason,
    model: String,
    input_tokens: u64,
    output_tokens: u64,
}

impl FakeResponse {
    /// A text answer ending the turn
    pub fn make(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_use: None,
            stop_reason: StopReason::EndTurn,
            model: DEFAULT_MODEL.to_string(),
            input_tokens: 10,
            output_tokens: 50,
        }
    }

    /// A request to call `name` with `input`, stopping for tool use
    pub fn with_tool_use(name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_use: Some((name.into(), input)),
            stop_reason: StopReason::ToolUse,
            ..Self::make("")
        }
    }

    pub fn stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = reason;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Materialize the response with fresh `msg_fake_` / `toolu_fake_` ids.
    ///
    /// Empty text produces no text block.
    pub fn to_message(&self) -> MessageResponse {
        let mut content = Vec::new();
        if !self.text.is_empty() {
            content.push(ContentBlock::Text(TextBlock::new(&self.text)));
        }
        if let Some((name, input)) = &self.tool_use {
            content.push(ContentBlock::ToolUse(ToolUseBlock::new(
                fake_id("toolu_fake_"),
                name,
                input.clone(),
            )));
        }

        MessageResponse {
            id: fake_id("msg_fake_"),
            role: MessageRole::Assistant,
            model: self.model.clone(),
            content,
            stop_reason: Some(self.stop_reason),
            stop_sequence: None,
            usage: Usage::new(self.input_tokens, self.output_tokens),
        }
    }

    /// The server-sent events a streamed version of this response would produce
    pub fn to_events(&self, chunk_size: usize) -> Vec<StreamEvent> {
        let message = self.to_message();
        let mut events = vec![StreamEvent::MessageStart {
            message: MessageResponse {
                content: Vec::new(),
                stop_reason: None,
                usage: Usage::new(self.input_tokens, 0),
                ..message.clone()
            },
        }];

        for (index, block) in message.content.iter().enumerate() {
            match block {
                ContentBlock::Text(text) => {
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlock::Text(TextBlock::new("")),
                    });
                    let chars: Vec<char> = text.text.chars().collect();
                    for piece in chars.chunks(chunk_size.max(1)) {
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: ContentDelta::TextDelta {
                                text: piece.iter().collect(),
                            },
                        });
                    }
                }
                ContentBlock::ToolUse(tool_use) => {
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlock::ToolUse(ToolUseBlock::new(
                            &tool_use.id,
                            &tool_use.name,
                            Value::Object(Default::default()),
                        )),
                    });
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentDelta::InputJsonDelta {
                            partial_json: tool_use.input.to_string(),
                        },
                    });
                }
                _ => continue,
            }
            events.push(StreamEvent::ContentBlockStop { index });
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: message.stop_reason,
                stop_sequence: None,
            },
            usage: Some(DeltaUsage {
                output_tokens: self.output_tokens,
                input_tokens: None,
            }),
        });
        events.push(StreamEvent::MessageStop);
        events
    }
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Debug, Default)]
struct FakeState {
    responses: Vec<FakeResponse>,
    next: usize,
    failures: VecDeque<(ApiErrorKind, String)>,
    recorded: Vec<MessageRequest>,
}

impl FakeState {
    /// Record `request`, then fail or answer with the next queued response.
    fn answer(&mut self, request: &MessageRequest) -> Result<FakeResponse> {
        self.recorded.push(request.clone());

        if let Some((kind, message)) = self.failures.pop_front() {
            return Err(Error::api(kind, message));
        }

        let Some(response) = self.responses.get(self.next).or(self.responses.last()) else {
            return Ok(FakeResponse::make(FALLBACK_TEXT));
        };
        let response = response.clone();
        if self.next + 1 < self.responses.len() {
            self.next += 1;
        }
        Ok(response)
    }
}

/// In-memory [`MessagesApi`] with queued responses and request recording.
///
/// Responses are consumed in order and the last one repeats. With no responses
/// queued every call answers `"Fake response"`.
#[derive(Debug)]
pub struct FakeClient {
    state: Mutex<FakeState>,
    config: ClaudeConfig,
    chunk_size: usize,
}

impl Default for FakeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            config: ClaudeConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Replace the response queue
    pub fn respond_with(self, responses: impl IntoIterator<Item = FakeResponse>) -> Self {
        {
            let mut state = self.state();
            state.responses = responses.into_iter().collect();
            state.next = 0;
        }
        self
    }

    /// Configuration seen by conversations built from this fake
    pub fn with_config(mut self, config: ClaudeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn config(&self) -> &ClaudeConfig {
        &self.config
    }

    pub fn add_response(&self, response: FakeResponse) {
        self.state().responses.push(response);
    }

    /// Make the next call fail with an API error. Failures queue up in order.
    pub fn fail_next(&self, kind: ApiErrorKind, message: impl Into<String>) {
        self.state().failures.push_back((kind, message.into()));
    }

    /// A conversation using this fake, the configured default model and MCP table
    pub fn conversation(self: &Arc<Self>) -> ConversationBuilder {
        ConversationBuilder::new(self.clone(), &self.config.default_model)
            .with_mcp_table(self.config.mcp_servers.clone())
    }

    /// Every request received so far, streamed ones included
    pub fn recorded(&self) -> Vec<MessageRequest> {
        self.state().recorded.clone()
    }

    pub fn assert_sent<F>(&self, predicate: F)
    where
        F: Fn(&MessageRequest) -> bool,
    {
        assert!(
            self.state().recorded.iter().any(predicate),
            "The expected request was not sent."
        );
    }

    pub fn assert_not_sent<F>(&self, predicate: F)
    where
        F: Fn(&MessageRequest) -> bool,
    {
        assert!(
            !self.state().recorded.iter().any(predicate),
            "An unexpected request was sent."
        );
    }

    pub fn assert_sent_count(&self, count: usize) {
        let sent = self.state().recorded.len();
        assert_eq!(sent, count, "Expected {count} requests, but {sent} were sent.");
    }

    pub fn assert_nothing_sent(&self) {
        self.assert_sent_count(0);
    }

    // A panicking assertion poisons the lock; the data is still usable
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessagesApi for FakeClient {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse> {
        let response = self.state().answer(request)?;
        Ok(response.to_message())
    }

    async fn create_message_stream(&self, request: &MessageRequest) -> Result<EventStream> {
        let response = self.state().answer(request)?;
        let events = response.to_events(self.chunk_size);
        Ok(Box::pin(tokio_stream::iter(events.into_iter().map(Ok))))
    }
}
