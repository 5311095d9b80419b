//! Entry point tying configuration to a messages API.
//!
//! A [`Client`] owns the validated [`ClaudeConfig`] and the injected
//! [`MessagesApi`]. Everything else hangs off it:
//!
//! ```text
//! Client::new(config, api)   credentials checked once, here
//!     │
//!     ├─> conversation()     ConversationBuilder with the default model and MCP table
//!     ├─> dispatch(job, ..)  background job on the tokio runtime
//!     └─> cost_of(response)  usage priced from the pricing table
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use claude_conversation::{ClaudeConfig, Client};
//! use claude_conversation::testing::FakeClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> claude_conversation::Result<()> {
//! let config = ClaudeConfig::from_env()?;
//! let client = Client::new(config, Arc::new(FakeClient::new()))?;
//!
//! let mut conversation = client.conversation();
//! conversation.user("Hello!");
//! let response = conversation.send().await?;
//!
//! if let Some(cost) = client.cost_of(&response) {
//!     println!("{} cost {}", response.model, cost);
//! }
//! # Ok(())
//! # }
//! ```

use crate::api::MessagesApi;
use crate::config::ClaudeConfig;
use crate::conversation::ConversationBuilder;
use crate::cost::TokenCost;
use crate::job::{CallbackRegistry, ConversationJob};
use crate::types::MessageResponse;
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Configured access to the messages API.
#[derive(Clone)]
pub struct Client {
    config: ClaudeConfig,
    api: Arc<dyn MessagesApi>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client, failing fast if no credentials are configured.
    pub fn new(config: ClaudeConfig, api: Arc<dyn MessagesApi>) -> Result<Self> {
        config.validate_credentials()?;
        log::debug!(
            "Client ready: default model {}, {} MCP servers registered",
            config.default_model,
            config.mcp_servers.len()
        );
        Ok(Self { config, api })
    }

    pub fn config(&self) -> &ClaudeConfig {
        &self.config
    }

    pub fn api(&self) -> Arc<dyn MessagesApi> {
        self.api.clone()
    }

    /// A new conversation with the default model and registered MCP servers
    pub fn conversation(&self) -> ConversationBuilder {
        ConversationBuilder::new(self.api.clone(), &self.config.default_model)
            .with_mcp_table(self.config.mcp_servers.clone())
    }

    /// Run a background job against this client's API.
    pub fn dispatch(
        &self,
        job: ConversationJob,
        callbacks: Arc<CallbackRegistry>,
    ) -> JoinHandle<Result<MessageResponse>> {
        job.dispatch(self.api.clone(), callbacks)
    }

    /// Price a response's usage, `None` when the model has no pricing entry
    pub fn cost_of(&self, response: &MessageResponse) -> Option<TokenCost> {
        let pricing = self.config.pricing_for(&response.model)?;
        Some(TokenCost::calculate(
            response.usage.input_tokens,
            response.usage.output_tokens,
            &pricing,
            &response.model,
        ))
    }
}
