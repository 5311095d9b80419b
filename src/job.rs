//! Background conversation jobs.
//!
//! A [`ConversationJob`] carries a frozen [`ConversationConfig`], the id of a
//! registered [`ConversationCallback`] and caller-supplied context. It serializes to
//! JSON so it can cross a queue to another worker.
//!
//! Running a job makes exactly one logical API call. It never runs the tool loop,
//! because tool handlers are closures that only exist in the process that built the
//! conversation. Transient failures are retried with a fixed delay; when the call
//! finally succeeds or fails for good, the callback is told.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use claude_conversation::job::{CallbackRegistry, ConversationCallback};
//! use claude_conversation::testing::FakeClient;
//! use claude_conversation::{Error, MessageResponse};
//! use serde_json::{Map, Value};
//! use std::sync::Arc;
//!
//! struct Notify;
//!
//! #[async_trait]
//! impl ConversationCallback for Notify {
//!     async fn on_success(&self, response: &MessageResponse, _context: &Map<String, Value>) {
//!         println!("{}", response.full_text());
//!     }
//!
//!     async fn on_failure(&self, error: &Error, _context: &Map<String, Value>) {
//!         eprintln!("{error}");
//!     }
//! }
//!
//! # async fn example() -> claude_conversation::Result<()> {
//! let fake = Arc::new(FakeClient::new());
//! let callbacks = Arc::new(CallbackRegistry::new().register("notify", Notify));
//!
//! let mut conversation = fake.conversation();
//! conversation.user("Summarise this report");
//! let job = conversation.dispatch("notify", Map::new())?;
//!
//! job.dispatch(fake, callbacks).await.map_err(|e| Error::other(e.to_string()))??;
//! # Ok(())
//! # }
//! ```

use crate::api::{MessagesApi, surface_error};
use crate::payload::{ConversationConfig, PayloadBuilder};
use crate::retry::{RetryConfig, retry_with_backoff_conditional};
use crate::types::MessageResponse;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const DEFAULT_TRIES: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Receives the outcome of a background job.
#[async_trait]
pub trait ConversationCallback: Send + Sync {
    async fn on_success(&self, response: &MessageResponse, context: &Map<String, Value>);

    /// Called once, after the last attempt failed or a non-retryable error occurred
    async fn on_failure(&self, error: &Error, context: &Map<String, Value>);
}

/// Named callbacks a worker can resolve job callback ids against.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Arc<dyn ConversationCallback>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.callbacks.keys().collect();
        names.sort();
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &names)
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C>(mut self, id: impl Into<String>, callback: C) -> Self
    where
        C: ConversationCallback + 'static,
    {
        self.callbacks.insert(id.into(), Arc::new(callback));
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ConversationCallback>> {
        self.callbacks.get(id).cloned()
    }

    fn resolve(&self, id: &str) -> Result<Arc<dyn ConversationCallback>> {
        self.get(id)
            .ok_or_else(|| Error::config(format!("Conversation callback '{id}' is not registered")))
    }
}

/// A conversation frozen for background execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationJob {
    pub config: ConversationConfig,
    pub callback: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Total attempts, first one included
    #[serde(default = "default_tries")]
    pub tries: u32,
    /// Fixed delay between attempts
    #[serde(default = "default_backoff")]
    pub backoff: Duration,
}

fn default_tries() -> u32 {
    DEFAULT_TRIES
}

fn default_backoff() -> Duration {
    DEFAULT_BACKOFF
}

impl ConversationJob {
    pub fn new(
        config: ConversationConfig,
        callback: impl Into<String>,
        context: Map<String, Value>,
    ) -> Self {
        Self {
            config,
            callback: callback.into(),
            context,
            tries: DEFAULT_TRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_tries(mut self, tries: u32) -> Self {
        self.tries = tries.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::fixed(self.tries, self.backoff)
    }

    /// One attempt: build the request and make a single API call.
    pub async fn handle(&self, api: &dyn MessagesApi) -> Result<MessageResponse> {
        let request = PayloadBuilder::from_config(self.config.clone()).build();
        api.create_message(&request).await.map_err(surface_error)
    }

    /// Run the job to completion and notify its callback.
    ///
    /// An unknown callback id fails before any API call is made.
    pub async fn run(
        &self,
        api: &dyn MessagesApi,
        callbacks: &CallbackRegistry,
    ) -> Result<MessageResponse> {
        let callback = callbacks.resolve(&self.callback)?;

        log::debug!(
            "Running conversation job for '{}' ({} tries, {:?} backoff)",
            self.callback,
            self.tries,
            self.backoff
        );
        let result = retry_with_backoff_conditional(self.retry_config(), || self.handle(api)).await;

        match &result {
            Ok(response) => callback.on_success(response, &self.context).await,
            Err(err) => {
                log::error!("Conversation job for '{}' failed: {}", self.callback, err);
                callback.on_failure(err, &self.context).await;
            }
        }

        result
    }

    /// Run the job on the tokio runtime.
    pub fn dispatch(
        self,
        api: Arc<dyn MessagesApi>,
        callbacks: Arc<CallbackRegistry>,
    ) -> JoinHandle<Result<MessageResponse>> {
        tokio::spawn(async move { self.run(api.as_ref(), &callbacks).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApiErrorKind;
    use crate::testing::{FakeClient, FakeResponse};
    use crate::types::Message;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ConversationCallback for Arc<Recorder> {
        async fn on_success(&self, response: &MessageResponse, context: &Map<String, Value>) {
            self.events.lock().unwrap().push(format!(
                "success:{}:{}",
                response.full_text(),
                context["order"]
            ));
        }

        async fn on_failure(&self, error: &Error, _context: &Map<String, Value>) {
            self.events.lock().unwrap().push(format!("failure:{error}"));
        }
    }

    fn job() -> ConversationJob {
        let mut config = ConversationConfig::new("claude-haiku-4-5");
        config.messages.push(Message::user("Hello"));
        let mut context = Map::new();
        context.insert("order".to_string(), Value::from(42));
        ConversationJob::new(config, "recorder", context).with_backoff(Duration::from_millis(1))
    }

    #[test]
    fn test_json_round_trip_keeps_defaults() {
        let job = ConversationJob::new(ConversationConfig::new("m"), "cb", Map::new());
        let restored = ConversationJob::from_json(&job.to_json().unwrap()).unwrap();
        assert_eq!(restored, job);
        assert_eq!(restored.tries, 3);
        assert_eq!(restored.backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_json_round_trip_keeps_cached_system_prompt() {
        let mut config = ConversationConfig::new("m");
        config.system = Some(crate::CachedContent::make("Reference docs").into());
        let job = ConversationJob::new(config, "cb", Map::new());

        let json = job.to_json().unwrap();
        assert!(json.contains(r#"{"type":"text","text":"Reference docs","cache_control":{"type":"ephemeral"}}"#));
        assert_eq!(ConversationJob::from_json(&json).unwrap(), job);
    }

    #[tokio::test]
    async fn test_success_calls_back_with_context() {
        let fake = FakeClient::new().respond_with([FakeResponse::make("done")]);
        let recorder = Arc::new(Recorder::default());
        let callbacks = CallbackRegistry::new().register("recorder", recorder.clone());

        job().run(&fake, &callbacks).await.unwrap();

        assert_eq!(*recorder.events.lock().unwrap(), vec!["success:done:42"]);
        fake.assert_sent_count(1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let fake = FakeClient::new().respond_with([FakeResponse::make("ok")]);
        fake.fail_next(ApiErrorKind::Server, "overloaded");
        let recorder = Arc::new(Recorder::default());
        let callbacks = CallbackRegistry::new().register("recorder", recorder.clone());

        let response = job().run(&fake, &callbacks).await.unwrap();

        assert_eq!(response.text(), Some("ok"));
        assert_eq!(fake.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_failure_calls_on_failure_once() {
        let fake = FakeClient::new();
        fake.fail_next(ApiErrorKind::Authentication, "invalid x-api-key");
        let recorder = Arc::new(Recorder::default());
        let callbacks = CallbackRegistry::new().register("recorder", recorder.clone());

        let err = job().run(&fake, &callbacks).await.unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        fake.assert_sent_count(1);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("failure:Configuration error: Invalid API credentials"));
    }

    #[tokio::test]
    async fn test_unknown_callback_makes_no_call() {
        let fake = FakeClient::new();
        let err = job().run(&fake, &CallbackRegistry::new()).await.unwrap_err();
        assert!(err.to_string().contains("'recorder' is not registered"));
        fake.assert_nothing_sent();
    }
}
