//! Fake API behavior tests
//!
//! The fake is public API: downstream crates test their conversations with it, so
//! its response queue, id formats and assertions are pinned down here.

use claude_conversation::testing::{FakeClient, FakeResponse};
use claude_conversation::{
    ApiErrorKind, ClaudeConfig, ContentBlock, MessagesApi, PayloadBuilder, StopReason,
    ConversationConfig, McpServerConfig,
};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

fn request() -> claude_conversation::MessageRequest {
    PayloadBuilder::from_config(ConversationConfig::new("claude-haiku-4-5")).build()
}

#[tokio::test]
async fn test_ids_follow_fake_format() {
    let message_id = Regex::new(r"^msg_fake_[0-9a-f]{16}$").unwrap();
    let tool_id = Regex::new(r"^toolu_fake_[0-9a-f]{16}$").unwrap();

    let fake = FakeClient::new().respond_with([FakeResponse::with_tool_use("search", json!({}))]);
    let first = tokio_test::assert_ok!(fake.create_message(&request()).await);
    let second = tokio_test::assert_ok!(fake.create_message(&request()).await);

    assert!(message_id.is_match(&first.id), "{}", first.id);
    let ContentBlock::ToolUse(block) = &first.content[0] else {
        panic!("expected tool_use");
    };
    assert!(tool_id.is_match(&block.id), "{}", block.id);

    // Fresh ids per materialization
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_response_options() {
    let fake = FakeClient::new().respond_with([FakeResponse::make("cut off")
        .stop_reason(StopReason::MaxTokens)
        .model("claude-opus-4-1")
        .usage(1200, 4096)]);

    let response = tokio_test::assert_ok!(fake.create_message(&request()).await);
    assert_eq!(response.stop_reason, Some(StopReason::MaxTokens));
    assert_eq!(response.model, "claude-opus-4-1");
    assert_eq!(response.usage.input_tokens, 1200);
    assert_eq!(response.usage.output_tokens, 4096);
}

#[tokio::test]
async fn test_added_responses_extend_queue() {
    let fake = FakeClient::new().respond_with([FakeResponse::make("first")]);
    fake.add_response(FakeResponse::make("second"));

    let first = fake.create_message(&request()).await.unwrap();
    let second = fake.create_message(&request()).await.unwrap();
    let third = fake.create_message(&request()).await.unwrap();

    assert_eq!(first.text(), Some("first"));
    assert_eq!(second.text(), Some("second"));
    assert_eq!(third.text(), Some("second"));
}

#[tokio::test]
async fn test_failures_precede_responses() {
    let fake = FakeClient::new().respond_with([FakeResponse::make("recovered")]);
    fake.fail_next(ApiErrorKind::Server, "overloaded");
    fake.fail_next(ApiErrorKind::RateLimit, "slow down");

    let first = tokio_test::assert_err!(fake.create_message(&request()).await);
    let second = tokio_test::assert_err!(fake.create_message(&request()).await);
    let third = tokio_test::assert_ok!(fake.create_message(&request()).await);

    assert_eq!(first.api_kind(), Some(ApiErrorKind::Server));
    assert_eq!(second.api_kind(), Some(ApiErrorKind::RateLimit));
    assert_eq!(third.text(), Some("recovered"));
    fake.assert_sent_count(3);
}

#[tokio::test]
async fn test_conversation_uses_fake_config() {
    let config = ClaudeConfig::new()
        .with_default_model("claude-haiku-4-5-20251001")
        .with_mcp_server("docs", McpServerConfig::new("https://docs.example.com/mcp"));
    let fake = Arc::new(FakeClient::new().with_config(config));

    let mut conversation = fake.conversation();
    conversation.user("Hi").mcp(["docs"]).unwrap();
    conversation.send().await.unwrap();

    fake.assert_sent(|request| {
        request.model == "claude-haiku-4-5-20251001"
            && request
                .mcp_servers
                .as_ref()
                .is_some_and(|servers| servers[0].name == "docs")
    });
    fake.assert_not_sent(|request| request.model == claude_conversation::DEFAULT_MODEL);
}

#[test]
#[should_panic(expected = "The expected request was not sent.")]
fn test_assert_sent_panics_when_nothing_matches() {
    FakeClient::new().assert_sent(|_| true);
}

#[test]
#[should_panic(expected = "Expected 2 requests, but 0 were sent.")]
fn test_assert_sent_count_reports_actual() {
    FakeClient::new().assert_sent_count(2);
}
