//! The message API seam.
//!
//! HTTP transport lives outside this crate. Anything that can answer a
//! [`MessageRequest`] implements [`MessagesApi`]: a real HTTP client, a proxy, or the
//! deterministic [`FakeClient`](crate::testing::FakeClient) used in tests.

use crate::{ApiErrorKind, Error, Result};
use crate::payload::MessageRequest;
use crate::types::{MessageResponse, StreamEvent};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Events of one streamed response, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Capability to call the Claude messages endpoint.
///
/// Implementations report failures as [`Error::Api`](crate::Error::Api) with the
/// matching [`ApiErrorKind`](crate::ApiErrorKind) so callers and background jobs can
/// decide whether to retry.
#[async_trait]
pub trait MessagesApi: Send + Sync {
    /// Send one request and wait for the complete response.
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse>;

    /// Send one request and receive its server-sent events.
    async fn create_message_stream(&self, request: &MessageRequest) -> Result<EventStream>;
}

/// Rewrite collaborator failures into what callers of `send()` and jobs see.
///
/// Rejected credentials are a configuration problem, not a transient API failure.
pub(crate) fn surface_error(err: Error) -> Error {
    match err {
        Error::Api {
            kind: ApiErrorKind::Authentication,
            ..
        } => Error::config(
            "Invalid API credentials. Check your ANTHROPIC_API_KEY or ANTHROPIC_AUTH_TOKEN.",
        ),
        Error::Api {
            kind: ApiErrorKind::Connection,
            message,
            retry_after,
        } => Error::Api {
            kind: ApiErrorKind::Connection,
            message: format!("Failed to connect to Claude API: {message}"),
            retry_after,
        },
        other => other,
    }
}
