//! Configuration for the conversation layer
//!
//! [`ClaudeConfig`] holds credentials, defaults, the pre-registered MCP server table
//! and the model pricing table. Build it in code or read it from the environment:
//!
//! | Variable               | Field           | Default                        |
//! |------------------------|-----------------|--------------------------------|
//! | `ANTHROPIC_API_KEY`    | `api_key`       | none                           |
//! | `ANTHROPIC_AUTH_TOKEN` | `auth_token`    | none                           |
//! | `ANTHROPIC_BASE_URL`   | `base_url`      | none (transport default)       |
//! | `CLAUDE_MODEL`         | `default_model` | [`DEFAULT_MODEL`]              |
//! | `CLAUDE_TIMEOUT`       | `timeout`       | 30 seconds                     |
//!
//! # Examples
//!
//! ```rust
//! use claude_conversation::{ClaudeConfig, McpServerConfig};
//!
//! let config = ClaudeConfig::new()
//!     .with_api_key("sk-ant-test")
//!     .with_mcp_server("docs", McpServerConfig::new("https://mcp.example.com"));
//!
//! assert!(config.validate_credentials().is_ok());
//! assert_eq!(config.pricing_for("claude-sonnet-4-5-20250929").map(|p| p.input), Some(3.0));
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

/// Model used when neither the caller nor `CLAUDE_MODEL` picks one
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Optional API features enabled through the `anthropic-beta` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetaFeatures {
    pub mcp_connector: bool,
    pub extended_thinking: bool,
    pub prompt_caching: bool,
    pub structured_outputs: bool,
}

impl Default for BetaFeatures {
    fn default() -> Self {
        Self {
            mcp_connector: true,
            extended_thinking: true,
            prompt_caching: true,
            structured_outputs: true,
        }
    }
}

impl BetaFeatures {
    /// Every feature off
    pub fn none() -> Self {
        Self {
            mcp_connector: false,
            extended_thinking: false,
            prompt_caching: false,
            structured_outputs: false,
        }
    }

    /// Comma-separated header value, `None` when nothing is enabled
    pub fn header_value(&self) -> Option<String> {
        let flags = [
            (self.mcp_connector, "mcp-client-2025-11-20"),
            (self.extended_thinking, "extended-thinking-2024-12-17"),
            (self.prompt_caching, "prompt-caching-2024-07-31"),
            (self.structured_outputs, "structured-outputs-2024-12-17"),
        ];

        let enabled: Vec<&str> = flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();

        (!enabled.is_empty()).then(|| enabled.join(","))
    }
}

/// Entry of the pre-registered MCP server table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default)]
    pub denied_tools: Option<Vec<String>>,
}

impl McpServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            token: None,
            allowed_tools: None,
            denied_tools: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

/// Credentials, defaults and lookup tables.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeConfig {
    pub api_key: Option<String>,
    pub auth_token: Option<String>,
    pub base_url: Option<String>,
    pub default_model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub beta_features: BetaFeatures,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// Model pattern to price; the longest pattern contained in a model id wins
    pub pricing: BTreeMap<String, ModelPricing>,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        let pricing = [
            ("claude-opus", ModelPricing::new(15.0, 75.0)),
            ("claude-sonnet", ModelPricing::new(3.0, 15.0)),
            ("claude-haiku", ModelPricing::new(0.25, 1.25)),
        ]
        .into_iter()
        .map(|(pattern, price)| (pattern.to_string(), price))
        .collect();

        Self {
            api_key: None,
            auth_token: None,
            base_url: None,
            default_model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            beta_features: BetaFeatures::default(),
            mcp_servers: BTreeMap::new(),
            pricing,
        }
    }
}

// Credentials stay out of debug output
impl std::fmt::Debug for ClaudeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("beta_features", &self.beta_features)
            .field("mcp_servers", &self.mcp_servers.keys().collect::<Vec<_>>())
            .field("pricing", &self.pricing)
            .finish()
    }
}

impl ClaudeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values count as unset.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        config.api_key = get("ANTHROPIC_API_KEY");
        config.auth_token = get("ANTHROPIC_AUTH_TOKEN");
        config.base_url = get("ANTHROPIC_BASE_URL");

        if let Some(model) = get("CLAUDE_MODEL") {
            config.default_model = model;
        }

        if let Some(raw) = get("CLAUDE_TIMEOUT") {
            let seconds: u64 = raw.trim().parse().map_err(|_| {
                Error::config(format!("CLAUDE_TIMEOUT must be a whole number of seconds, got '{raw}'"))
            })?;
            config.timeout = Duration::from_secs(seconds);
        }

        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_beta_features(mut self, features: BetaFeatures) -> Self {
        self.beta_features = features;
        self
    }

    pub fn with_mcp_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    pub fn with_pricing(mut self, pattern: impl Into<String>, pricing: ModelPricing) -> Self {
        self.pricing.insert(pattern.into(), pricing);
        self
    }

    /// Fail unless a non-empty API key or auth token is present
    pub fn validate_credentials(&self) -> Result<()> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|value| !value.trim().is_empty())
        };

        if present(&self.api_key) || present(&self.auth_token) {
            Ok(())
        } else {
            Err(Error::config(
                "Either ANTHROPIC_API_KEY or ANTHROPIC_AUTH_TOKEN must be configured",
            ))
        }
    }

    /// Value for the `anthropic-beta` header
    pub fn beta_header(&self) -> Option<String> {
        self.beta_features.header_value()
    }

    pub fn mcp_server(&self, name: &str) -> Option<&McpServerConfig> {
        self.mcp_servers.get(name)
    }

    /// Price for `model`, matched by the longest configured pattern it contains
    pub fn pricing_for(&self, model: &str) -> Option<ModelPricing> {
        self.pricing
            .iter()
            .filter(|(pattern, _)| model.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, pricing)| *pricing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClaudeConfig::default();
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 2);
        assert!(config.mcp_servers.is_empty());
    }

    #[test]
    fn test_from_env_with() {
        let config = ClaudeConfig::from_env_with(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-ant-123"),
            ("ANTHROPIC_AUTH_TOKEN", ""),
            ("CLAUDE_MODEL", "claude-opus-4-1"),
            ("CLAUDE_TIMEOUT", "90"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-ant-123"));
        assert_eq!(config.auth_token, None);
        assert_eq!(config.default_model, "claude-opus-4-1");
        assert_eq!(config.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_from_env_with_bad_timeout() {
        let err = ClaudeConfig::from_env_with(lookup(&[("CLAUDE_TIMEOUT", "soon")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_validate_credentials() {
        let err = ClaudeConfig::new().validate_credentials().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Either ANTHROPIC_API_KEY or ANTHROPIC_AUTH_TOKEN must be configured"
        );

        assert!(ClaudeConfig::new().with_api_key("  ").validate_credentials().is_err());
        assert!(ClaudeConfig::new().with_auth_token("tok").validate_credentials().is_ok());
    }

    #[test]
    fn test_beta_header() {
        let config = ClaudeConfig::new();
        let header = config.beta_header().unwrap();
        assert!(header.starts_with("mcp-client-2025-11-20,"));
        assert_eq!(header.split(',').count(), 4);

        let off = config.with_beta_features(BetaFeatures::none());
        assert_eq!(off.beta_header(), None);
    }

    #[test]
    fn test_pricing_longest_match() {
        let config = ClaudeConfig::new().with_pricing("claude-opus-4-1", ModelPricing::new(20.0, 100.0));

        assert_eq!(config.pricing_for("claude-opus-4-1-20250805").map(|p| p.input), Some(20.0));
        assert_eq!(config.pricing_for("claude-opus-4-0").map(|p| p.input), Some(15.0));
        assert_eq!(config.pricing_for("claude-3-5-haiku-latest"), None);
        assert_eq!(config.pricing_for("claude-haiku-4-5").map(|p| p.output), Some(1.25));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ClaudeConfig::new().with_api_key("sk-ant-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-secret"));
    }
}
