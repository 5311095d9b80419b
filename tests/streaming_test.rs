//! Streaming integration tests
//!
//! Streams canned responses through `ConversationBuilder::stream()` and a hand-rolled
//! API that fails mid-stream, checking chunk order, listeners and error wrapping.

use async_trait::async_trait;
use claude_conversation::testing::{FakeClient, FakeResponse};
use claude_conversation::{
    ApiErrorKind, ContentDelta, Error, EventListeners, EventStream, MessageRequest,
    MessageResponse, MessagesApi, StopReason, StreamChunk, StreamEvent,
};
use std::sync::{Arc, Mutex};

/// Emits `events`, then fails with a connection error
struct BrokenStream {
    events: Vec<StreamEvent>,
}

#[async_trait]
impl MessagesApi for BrokenStream {
    async fn create_message(&self, _request: &MessageRequest) -> claude_conversation::Result<MessageResponse> {
        Err(Error::api(ApiErrorKind::Other, "not used"))
    }

    async fn create_message_stream(
        &self,
        _request: &MessageRequest,
    ) -> claude_conversation::Result<EventStream> {
        let mut items: Vec<claude_conversation::Result<StreamEvent>> =
            self.events.iter().cloned().map(Ok).collect();
        items.push(Err(Error::api(ApiErrorKind::Connection, "connection reset")));
        Ok(Box::pin(tokio_stream::iter(items)))
    }
}

fn text_delta(text: &str) -> StreamEvent {
    StreamEvent::ContentBlockDelta {
        index: 0,
        delta: ContentDelta::TextDelta {
            text: text.to_string(),
        },
    }
}

#[tokio::test]
async fn test_hello_world_single_chunk() {
    let fake = Arc::new(FakeClient::new().respond_with([FakeResponse::make("Hello world")]));
    let mut conversation = fake.conversation();
    conversation.user("Say hello");

    let mut chunks: Vec<StreamChunk> = Vec::new();
    let complete = conversation
        .stream(|chunk| chunks.push(chunk.clone()))
        .await
        .unwrap();

    let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(joined, "Hello world");
    assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0]);
    assert_eq!(complete.full_text, "Hello world");
    assert_eq!(complete.stop_reason, Some(StopReason::EndTurn));
}

#[tokio::test]
async fn test_long_text_indices_have_no_gaps() {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(5);
    let fake = Arc::new(FakeClient::new().respond_with([FakeResponse::make(text.clone())]));
    let mut conversation = fake.conversation();
    conversation.user("Tell me about foxes");

    let mut chunks: Vec<StreamChunk> = Vec::new();
    let complete = conversation
        .stream(|chunk| chunks.push(chunk.clone()))
        .await
        .unwrap();

    let expected = text.chars().count().div_ceil(20);
    assert_eq!(chunks.len(), expected);
    for (position, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, position);
        assert!(chunk.text.chars().count() <= 20);
        assert_eq!(chunk.chunk_type, "text_delta");
    }
    assert_eq!(complete.full_text, text);

    let message = complete.message.as_ref().unwrap();
    assert!(message.id.starts_with("msg_fake_"));
    assert_eq!(complete.usage().output_tokens, 50);

    // Streamed text becomes one assistant message
    assert_eq!(conversation.history().last().unwrap().text(), Some(text.as_str()));
}

#[tokio::test]
async fn test_listeners_see_chunks_and_completion() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let chunk_log = seen.clone();
    let complete_log = seen.clone();
    let listeners = EventListeners::new()
        .on_stream_chunk(move |chunk| chunk_log.lock().unwrap().push(format!("chunk:{}", chunk.index)))
        .on_stream_complete(move |complete| {
            complete_log
                .lock()
                .unwrap()
                .push(format!("complete:{}", complete.full_text.len()))
        });

    let fake = Arc::new(
        FakeClient::new()
            .with_chunk_size(4)
            .respond_with([FakeResponse::make("abcdefgh")]),
    );
    let mut conversation = fake.conversation();
    conversation.user("Go").listeners(listeners);

    conversation.stream(|_| {}).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["chunk:0", "chunk:1", "complete:8"]
    );
}

#[tokio::test]
async fn test_interrupted_stream_keeps_cause() {
    let api = Arc::new(BrokenStream {
        events: vec![text_delta("partial "), text_delta("answer")],
    });
    let mut conversation = claude_conversation::ConversationBuilder::new(api, "claude-haiku-4-5");
    conversation.user("Hi");

    let mut received = Vec::new();
    let err = conversation
        .stream(|chunk| received.push(chunk.text.clone()))
        .await
        .unwrap_err();

    // Chunks before the failure were delivered
    assert_eq!(received, vec!["partial ", "answer"]);

    match &err {
        Error::Streaming { message, source } => {
            assert!(message.starts_with("Stream interrupted"));
            assert_eq!(source.api_kind(), Some(ApiErrorKind::Connection));
        }
        other => panic!("expected streaming error, got {other:?}"),
    }
    assert!(std::error::Error::source(&err).is_some());

    // Nothing appended for a failed stream
    assert_eq!(conversation.history().len(), 1);
}

#[tokio::test]
async fn test_failure_to_start_is_wrapped() {
    let fake = Arc::new(FakeClient::new());
    fake.fail_next(ApiErrorKind::Server, "overloaded");

    let mut conversation = fake.conversation();
    conversation.user("Hi");
    let err = conversation.stream(|_| {}).await.unwrap_err();

    assert!(err.to_string().starts_with("Failed to create stream"));
    fake.assert_sent_count(1);
}

#[tokio::test]
async fn test_error_event_ends_stream() {
    let api = Arc::new(BrokenStream {
        events: vec![StreamEvent::Error {
            error: claude_conversation::StreamErrorBody {
                kind: "rate_limit_error".to_string(),
                message: "Too many requests".to_string(),
            },
        }],
    });
    let mut conversation = claude_conversation::ConversationBuilder::new(api, "m");
    conversation.user("Hi");

    let err = conversation.stream(|_| {}).await.unwrap_err();
    let Error::Streaming { source, .. } = err else {
        panic!("expected streaming error");
    };
    assert_eq!(source.api_kind(), Some(ApiErrorKind::RateLimit));
}
