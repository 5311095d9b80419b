//! Stateful conversations and the multi-step tool loop.
//!
//! A [`ConversationBuilder`] accumulates a message history and request settings, then
//! drives one of three execution modes:
//!
//! - [`send`](ConversationBuilder::send): call the API, run requested tools, feed the
//!   results back, repeat until the model answers or the step budget runs out
//! - [`stream`](ConversationBuilder::stream): one streamed call, text chunks pushed to
//!   a sink, no tool loop
//! - [`dispatch`](ConversationBuilder::dispatch): freeze the conversation into a
//!   [`ConversationJob`] for background execution
//!
//! ## The tool loop
//!
//! ```text
//!          ┌──────────────────────────────────────────────────────┐
//!          ▼                                                      │
//!   call messages API ──▶ stop_reason == tool_use                 │
//!          │              and an executable tool requested?       │
//!          │                  │ no            │ yes               │
//!          │                  ▼               ▼                   │
//!          │        append first text    run every tool_use       │
//!          │        block, return        append assistant echo    │
//!          │                             and tool results ────────┘
//!          │                             (until max_steps calls)
//! ```
//!
//! When the budget is exhausted the last response is returned as-is, even if it still
//! asks for tools; check [`MessageResponse::stop_reason`] to detect the truncation.
//!
//! ## Setters
//!
//! Setters that constrain their input return `Result<&mut Self>` and leave the
//! builder untouched when they reject a value:
//!
//! ```rust,no_run
//! use claude_conversation::testing::FakeClient;
//! use claude_conversation::tool;
//! use std::sync::Arc;
//!
//! # async fn example() -> claude_conversation::Result<()> {
//! let fake = Arc::new(FakeClient::new());
//! let mut conversation = fake.conversation();
//!
//! conversation
//!     .system("You are a weather assistant")
//!     .user("What's the weather in Paris?")
//!     .temperature(0.2)?
//!     .max_steps(3)?
//!     .tools([tool("get_weather", "Current weather for a city")
//!         .required_param("city", "string", "City name")
//!         .build(|input| async move {
//!             Ok(format!("Sunny in {}", input["city"].as_str().unwrap_or("?")))
//!         })])?;
//!
//! let response = conversation.send().await?;
//! println!("{}", response.full_text());
//! # Ok(())
//! # }
//! ```

use crate::api::{MessagesApi, surface_error};
use crate::config::McpServerConfig;
use crate::events::EventListeners;
use crate::executor::ToolExecutor;
use crate::job::ConversationJob;
use crate::mcp::{McpServer, McpServerRef, validate_url};
use crate::payload::{ConversationConfig, DEFAULT_SCHEMA_TOOL, MessageRequest, PayloadBuilder};
use crate::streaming::StreamHandler;
use crate::tools::{Tool, ToolRegistry};
use crate::types::{
    ContentBlock, DocumentBlock, ImageBlock, MediaSource, Message, MessageResponse,
    StreamChunk, StreamComplete, SystemPrompt, TextBlock,
};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Minimum extended thinking budget accepted by the API
pub const MIN_THINKING_BUDGET: u32 = 1024;

/// Fluent, stateful conversation with one model.
pub struct ConversationBuilder {
    api: Arc<dyn MessagesApi>,
    model: String,
    system: Option<SystemPrompt>,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: Option<f64>,
    stop_sequences: Vec<String>,
    top_k: Option<u32>,
    top_p: Option<f64>,
    metadata: Option<Map<String, Value>>,
    service_tier: Option<String>,
    tools: ToolRegistry,
    mcp_servers: Vec<McpServer>,
    max_steps: u32,
    thinking_budget: Option<u32>,
    json_schema: Option<Value>,
    json_schema_name: Option<String>,
    timeout: Option<Duration>,
    listeners: EventListeners,
    mcp_table: BTreeMap<String, McpServerConfig>,
}

impl std::fmt::Debug for ConversationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationBuilder")
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("max_tokens", &self.max_tokens)
            .field("tools", &self.tools)
            .field("mcp_servers", &self.mcp_servers)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

impl ConversationBuilder {
    /// A conversation with `model`, 1024 max tokens and a single step.
    pub fn new(api: Arc<dyn MessagesApi>, model: impl Into<String>) -> Self {
        Self {
            api,
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
            tools: ToolRegistry::new(),
            mcp_servers: Vec::new(),
            max_steps: 1,
            thinking_budget: None,
            json_schema: None,
            json_schema_name: None,
            timeout: None,
            listeners: EventListeners::new(),
            mcp_table: BTreeMap::new(),
        }
    }

    /// Pre-registered MCP servers that [`mcp`](Self::mcp) resolves names against
    pub fn with_mcp_table(mut self, table: BTreeMap<String, McpServerConfig>) -> Self {
        self.mcp_table = table;
        self
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    pub fn model(&mut self, model: impl Into<String>) -> &mut Self {
        self.model = model.into();
        self
    }

    /// Plain text, or [`CachedContent`](crate::CachedContent) for a cacheable prompt
    pub fn system(&mut self, system: impl Into<SystemPrompt>) -> &mut Self {
        self.system = Some(system.into());
        self
    }

    pub fn user(&mut self, text: impl Into<String>) -> &mut Self {
        self.messages.push(Message::user(text));
        self
    }

    /// A user turn made of arbitrary content blocks
    pub fn user_blocks(&mut self, blocks: Vec<ContentBlock>) -> &mut Self {
        self.messages.push(Message::user_blocks(blocks));
        self
    }

    pub fn assistant(&mut self, text: impl Into<String>) -> &mut Self {
        self.messages.push(Message::assistant(text));
        self
    }

    /// A user turn with a base64 image, optionally followed by text
    pub fn image(
        &mut self,
        data: impl Into<String>,
        media_type: impl Into<String>,
        text: Option<&str>,
    ) -> &mut Self {
        let image = ContentBlock::Image(ImageBlock {
            source: MediaSource::Base64 {
                media_type: media_type.into(),
                data: data.into(),
            },
        });
        self.push_media(image, text);
        self
    }

    /// A user turn with an image fetched by the API from `url`.
    ///
    /// The URL goes through the same SSRF checks as MCP servers.
    pub fn image_url(&mut self, url: &str, text: Option<&str>) -> Result<&mut Self> {
        validate_url(url)?;
        let image = ContentBlock::Image(ImageBlock {
            source: MediaSource::Url {
                url: url.to_string(),
            },
        });
        self.push_media(image, text);
        Ok(self)
    }

    /// A user turn with a base64 PDF, optionally followed by text
    pub fn pdf(&mut self, data: impl Into<String>, text: Option<&str>) -> &mut Self {
        let document = ContentBlock::Document(DocumentBlock {
            source: MediaSource::Base64 {
                media_type: "application/pdf".to_string(),
                data: data.into(),
            },
        });
        self.push_media(document, text);
        self
    }

    fn push_media(&mut self, media: ContentBlock, text: Option<&str>) {
        let mut blocks = vec![media];
        if let Some(text) = text {
            blocks.push(ContentBlock::Text(TextBlock::new(text)));
        }
        self.messages.push(Message::user_blocks(blocks));
    }

    // ========================================================================
    // PARAMETERS
    // ========================================================================

    pub fn max_tokens(&mut self, tokens: u32) -> Result<&mut Self> {
        if tokens < 1 {
            return Err(Error::validation(
                "maxTokens",
                tokens,
                "maxTokens must be at least 1",
            ));
        }
        self.max_tokens = tokens;
        Ok(self)
    }

    pub fn temperature(&mut self, temperature: f64) -> Result<&mut Self> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(Error::validation(
                "temperature",
                temperature,
                "Temperature must be between 0.0 and 1.0",
            ));
        }
        self.temperature = Some(temperature);
        Ok(self)
    }

    pub fn top_k(&mut self, k: u32) -> Result<&mut Self> {
        if k < 1 {
            return Err(Error::validation("topK", k, "topK must be at least 1"));
        }
        self.top_k = Some(k);
        Ok(self)
    }

    pub fn top_p(&mut self, p: f64) -> Result<&mut Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::validation(
                "topP",
                p,
                "topP must be between 0.0 and 1.0",
            ));
        }
        self.top_p = Some(p);
        Ok(self)
    }

    pub fn stop_sequences<I, S>(&mut self, sequences: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = sequences.into_iter().map(Into::into).collect();
        self
    }

    pub fn metadata(&mut self, metadata: Map<String, Value>) -> &mut Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn service_tier(&mut self, tier: impl Into<String>) -> &mut Self {
        self.service_tier = Some(tier.into());
        self
    }

    /// Default deadline for tools that do not declare their own
    pub fn timeout(&mut self, timeout: Duration) -> Result<&mut Self> {
        if timeout.is_zero() {
            return Err(Error::validation(
                "timeout",
                timeout.as_secs_f64(),
                "timeout must be positive",
            ));
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    pub fn extended_thinking(&mut self, budget_tokens: u32) -> Result<&mut Self> {
        if budget_tokens < MIN_THINKING_BUDGET {
            return Err(Error::validation(
                "budgetTokens",
                budget_tokens,
                "Extended thinking budget must be at least 1024 tokens",
            ));
        }
        self.thinking_budget = Some(budget_tokens);
        Ok(self)
    }

    /// Maximum number of API calls one `send()` may make
    pub fn max_steps(&mut self, steps: u32) -> Result<&mut Self> {
        if steps < 1 {
            return Err(Error::validation(
                "maxSteps",
                steps,
                "maxSteps must be at least 1",
            ));
        }
        self.max_steps = steps;
        Ok(self)
    }

    /// Force structured output matching `schema`, through a tool named `name`
    /// (`structured_output` by default).
    pub fn schema(&mut self, schema: Value, name: Option<&str>) -> &mut Self {
        self.json_schema = Some(schema);
        self.json_schema_name = Some(name.unwrap_or(DEFAULT_SCHEMA_TOOL).to_string());
        self
    }

    // ========================================================================
    // TOOLS
    // ========================================================================

    /// Replace the tool set. Tool names must be unique.
    pub fn tools(&mut self, tools: impl IntoIterator<Item = Tool>) -> Result<&mut Self> {
        self.tools = ToolRegistry::from_tools(tools)?;
        Ok(self)
    }

    /// Replace the MCP servers, resolving bare names against the registered table.
    pub fn mcp<I, S>(&mut self, servers: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<McpServerRef>,
    {
        let resolved = servers
            .into_iter()
            .map(|server| match server.into() {
                McpServerRef::Server(server) => Ok(server),
                McpServerRef::Named(name) => match self.mcp_table.get(&name) {
                    Some(config) => McpServer::from_config(&name, config),
                    None => Err(Error::validation(
                        "mcp_server",
                        &name,
                        format!("MCP server '{name}' not found in config"),
                    )),
                },
            })
            .collect::<Result<Vec<_>>>()?;

        self.mcp_servers = resolved;
        Ok(self)
    }

    /// Listeners notified of every stream chunk and the final aggregate
    pub fn listeners(&mut self, listeners: EventListeners) -> &mut Self {
        self.listeners = listeners;
        self
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Freeze the current state into a serializable snapshot.
    ///
    /// Fails if an MCP server has no name.
    pub fn to_config(&self) -> Result<ConversationConfig> {
        let mcp_servers = self
            .mcp_servers
            .iter()
            .map(McpServer::to_definition)
            .collect::<Result<Vec<_>>>()?;
        let mcp_toolsets = self
            .mcp_servers
            .iter()
            .map(McpServer::to_toolset)
            .collect::<Result<Vec<_>>>()?;

        Ok(ConversationConfig {
            model: self.model.clone(),
            system: self.system.clone(),
            messages: self.messages.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stop_sequences: self.stop_sequences.clone(),
            top_k: self.top_k,
            top_p: self.top_p,
            metadata: self.metadata.clone(),
            service_tier: self.service_tier.clone(),
            tools: self.tools.definitions(),
            mcp_servers,
            mcp_toolsets,
            max_steps: self.max_steps,
            thinking_budget: self.thinking_budget,
            json_schema: self.json_schema.clone(),
            json_schema_name: self.json_schema_name.clone(),
            timeout: self.timeout.map(|t| t.as_secs_f64()),
        })
    }

    /// The request `send()` would make next
    pub fn to_payload(&self) -> Result<MessageRequest> {
        Ok(PayloadBuilder::from_config(self.to_config()?).build())
    }

    /// Freeze the conversation into a background job.
    ///
    /// The job makes a single API call and never runs tools.
    pub fn dispatch(
        &self,
        callback: impl Into<String>,
        context: Map<String, Value>,
    ) -> Result<ConversationJob> {
        Ok(ConversationJob::new(self.to_config()?, callback, context))
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    /// Run the tool loop and return the final response.
    ///
    /// Tool failures are reported to the model as `is_error` results and never end
    /// the loop. API failures propagate; rejected credentials surface as
    /// [`Error::Configuration`].
    pub async fn send(&mut self) -> Result<MessageResponse> {
        let mut payload = PayloadBuilder::from_config(self.to_config()?);
        let executor = ToolExecutor::new(self.tools.clone()).with_default_timeout(self.timeout);
        let mut last_response = None;

        for step in 0..self.max_steps {
            let request = payload.build();
            log::debug!(
                "Conversation step {}/{}: {} messages to {}",
                step + 1,
                self.max_steps,
                request.messages.len(),
                request.model
            );

            let response = self
                .api
                .create_message(&request)
                .await
                .map_err(surface_error)?;

            if !response.wants_tools() || !executor.has_executable_tools(&response) {
                self.append_assistant_response(&response);
                return Ok(response);
            }

            let results = executor.execute_tools_from_response(&response).await;
            self.messages
                .extend(executor.build_tool_interaction_messages(&response, results));
            payload.set_messages(self.messages.clone());

            last_response = Some(response);
        }

        log::debug!(
            "Step budget of {} exhausted, returning last response",
            self.max_steps
        );
        last_response.ok_or_else(|| Error::config("maxSteps must be at least 1"))
    }

    /// Stream one response, calling `sink` with each text chunk as it arrives.
    ///
    /// Streaming does not run tools. The streamed text is appended to the history as
    /// one assistant message.
    pub async fn stream<F>(&mut self, sink: F) -> Result<StreamComplete>
    where
        F: FnMut(&StreamChunk),
    {
        let request = self.to_payload()?;
        let handler = StreamHandler::new(self.listeners.clone());
        let complete = handler.stream(self.api.as_ref(), &request, sink).await?;

        if let Some(message) = StreamHandler::assistant_content(&complete.full_text) {
            self.messages.push(message);
        }

        Ok(complete)
    }

    fn append_assistant_response(&mut self, response: &MessageResponse) {
        if let Some(ContentBlock::Text(block)) = response.content.first() {
            self.messages.push(Message::assistant(&block.text));
        }
    }
}
