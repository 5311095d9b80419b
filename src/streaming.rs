//! Streaming reduction.
//!
//! The messages stream is a sequence of server-sent events. Four kinds matter here:
//!
//! ```text
//! message_start        carries the in-progress message shell
//! content_block_delta  carries incremental text (text_delta)
//! message_delta        carries the stop reason and final output usage
//! message_stop         end of stream
//! ```
//!
//! [`StreamReducer`] folds those events into [`StreamChunk`]s and a final
//! [`StreamComplete`]; [`StreamHandler`] pulls events from a
//! [`MessagesApi`](crate::MessagesApi) stream, pushes each chunk to the caller's sink
//! and any registered listeners, and wraps every failure as
//! [`Error::Streaming`](crate::Error::Streaming) with the original cause attached.
//!
//! Consumption is pull driven: one event is fully processed, sink call included,
//! before the next one is requested.

use crate::api::MessagesApi;
use crate::events::EventListeners;
use crate::payload::MessageRequest;
use crate::types::{
    ContentBlock, ContentDelta, Message, MessageResponse, StopReason, StreamChunk,
    StreamComplete, StreamEvent, TextBlock,
};
use crate::{ApiErrorKind, Error, Result};
use futures::StreamExt;

/// Stateful fold over stream events.
///
/// Chunk indices start at zero and increase by one per text delta.
#[derive(Debug, Default)]
pub struct StreamReducer {
    message: Option<MessageResponse>,
    full_text: String,
    stop_reason: Option<StopReason>,
    next_index: usize,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, returning the chunk it produced, if any.
    ///
    /// An `error` event ends the stream with an API error.
    pub fn process_event(&mut self, event: StreamEvent) -> Result<Option<StreamChunk>> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.message = Some(message);
            }
            StreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
                ..
            } => {
                self.full_text.push_str(&text);
                let chunk = StreamChunk::new(text, self.next_index);
                self.next_index += 1;
                return Ok(Some(chunk));
            }
            StreamEvent::MessageDelta { delta, usage } => {
                self.stop_reason = delta.stop_reason;
                if let Some(message) = self.message.as_mut() {
                    message.stop_reason = delta.stop_reason;
                    message.stop_sequence = delta.stop_sequence;
                    if let Some(usage) = usage {
                        message.usage.output_tokens = usage.output_tokens;
                        if let Some(input) = usage.input_tokens {
                            message.usage.input_tokens = input;
                        }
                    }
                }
            }
            StreamEvent::Error { error } => {
                return Err(Error::api(api_error_kind(&error.kind), error.message));
            }
            // Thinking, signature and tool input deltas carry no text
            StreamEvent::ContentBlockDelta { .. }
            | StreamEvent::ContentBlockStart { .. }
            | StreamEvent::ContentBlockStop { .. }
            | StreamEvent::MessageStop
            | StreamEvent::Ping => {}
        }
        Ok(None)
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Finish the stream.
    ///
    /// The captured message shell gets the streamed text as its content.
    pub fn finish(self) -> StreamComplete {
        let full_text = self.full_text;
        let message = self.message.map(|mut message| {
            if message.content.is_empty() && !full_text.is_empty() {
                message.content = vec![ContentBlock::Text(TextBlock::new(&full_text))];
            }
            message
        });

        StreamComplete {
            message,
            full_text,
            stop_reason: self.stop_reason,
        }
    }
}

fn api_error_kind(kind: &str) -> ApiErrorKind {
    match kind {
        "rate_limit_error" => ApiErrorKind::RateLimit,
        "authentication_error" | "permission_error" => ApiErrorKind::Authentication,
        "invalid_request_error" | "not_found_error" | "request_too_large" => {
            ApiErrorKind::InvalidRequest
        }
        "api_error" | "overloaded_error" => ApiErrorKind::Server,
        _ => ApiErrorKind::Other,
    }
}

/// Drives one streamed request through a [`StreamReducer`].
#[derive(Debug, Clone, Default)]
pub struct StreamHandler {
    listeners: EventListeners,
}

impl StreamHandler {
    pub fn new(listeners: EventListeners) -> Self {
        Self { listeners }
    }

    /// Stream `request`, calling `sink` with each chunk in arrival order.
    pub async fn stream<F>(
        &self,
        api: &dyn MessagesApi,
        request: &MessageRequest,
        mut sink: F,
    ) -> Result<StreamComplete>
    where
        F: FnMut(&StreamChunk),
    {
        let mut events = api
            .create_message_stream(request)
            .await
            .map_err(|err| Error::streaming(format!("Failed to create stream: {err}"), err))?;

        let mut reducer = StreamReducer::new();
        while let Some(event) = events.next().await {
            let chunk = event
                .and_then(|event| reducer.process_event(event))
                .map_err(|err| Error::streaming(format!("Stream interrupted: {err}"), err))?;

            if let Some(chunk) = chunk {
                sink(&chunk);
                self.listeners.dispatch_chunk(&chunk);
            }
        }

        let complete = reducer.finish();
        log::debug!(
            "Stream complete: {} bytes of text, stop reason {:?}",
            complete.full_text.len(),
            complete.stop_reason
        );
        self.listeners.dispatch_complete(&complete);

        Ok(complete)
    }

    /// The assistant turn to append after streaming, `None` for empty text.
    pub fn assistant_content(full_text: &str) -> Option<Message> {
        (!full_text.is_empty()).then(|| Message::assistant(full_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeltaUsage, MessageDeltaBody, MessageRole, StreamErrorBody, Usage};

    fn shell() -> MessageResponse {
        MessageResponse {
            id: "msg_1".to_string(),
            role: MessageRole::Assistant,
            model: "claude-sonnet-4-5-20250929".to_string(),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::new(25, 1),
        }
    }

    fn text(index: usize, text: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::TextDelta {
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn test_reducer_collects_text_and_indices() {
        let mut reducer = StreamReducer::new();
        let events = vec![
            StreamEvent::MessageStart { message: shell() },
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::Text(TextBlock::new("")),
            },
            text(0, "Hello"),
            StreamEvent::Ping,
            text(0, " world"),
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(StopReason::EndTurn),
                    stop_sequence: None,
                },
                usage: Some(DeltaUsage {
                    output_tokens: 12,
                    input_tokens: None,
                }),
            },
            StreamEvent::MessageStop,
        ];

        let mut chunks = Vec::new();
        for event in events {
            if let Some(chunk) = reducer.process_event(event).unwrap() {
                chunks.push(chunk);
            }
        }

        let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(chunks.iter().all(|c| c.chunk_type == "text_delta"));

        let complete = reducer.finish();
        assert_eq!(complete.full_text, "Hello world");
        assert_eq!(complete.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(complete.usage(), Usage::new(25, 12));

        let message = complete.message.unwrap();
        assert_eq!(message.text(), Some("Hello world"));
        assert_eq!(message.stop_reason, Some(StopReason::EndTurn));
    }

    #[test]
    fn test_last_message_delta_wins() {
        let mut reducer = StreamReducer::new();
        for reason in [StopReason::ToolUse, StopReason::MaxTokens] {
            reducer
                .process_event(StreamEvent::MessageDelta {
                    delta: MessageDeltaBody {
                        stop_reason: Some(reason),
                        stop_sequence: None,
                    },
                    usage: None,
                })
                .unwrap();
        }
        assert_eq!(reducer.finish().stop_reason, Some(StopReason::MaxTokens));
    }

    #[test]
    fn test_non_text_deltas_emit_nothing() {
        let mut reducer = StreamReducer::new();
        let chunk = reducer
            .process_event(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::ThinkingDelta {
                    thinking: "hmm".to_string(),
                },
            })
            .unwrap();
        assert!(chunk.is_none());
        assert_eq!(reducer.full_text(), "");
    }

    #[test]
    fn test_error_event_fails() {
        let mut reducer = StreamReducer::new();
        let err = reducer
            .process_event(StreamEvent::Error {
                error: StreamErrorBody {
                    kind: "overloaded_error".to_string(),
                    message: "Overloaded".to_string(),
                },
            })
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Server));
    }

    #[test]
    fn test_assistant_content() {
        assert!(StreamHandler::assistant_content("").is_none());
        assert_eq!(
            StreamHandler::assistant_content("Hi"),
            Some(Message::assistant("Hi"))
        );
    }
}
