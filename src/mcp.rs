//! MCP server descriptors and SSRF-safe URL validation.
//!
//! An [`McpServer`] describes a remote tool provider the API connects to on the
//! caller's behalf. Because the API will reach out to whatever URL is sent, the URL is
//! validated once, at construction, and the host can never change afterwards.
//!
//! A server is frozen into two wire objects that must travel together:
//!
//! - [`McpServerDefinition`] goes into the request's `mcp_servers` list
//! - [`McpToolset`] goes into the request's `tools` list and carries the tool policy
//!
//! # Examples
//!
//! ```rust
//! use claude_conversation::McpServer;
//!
//! let server = McpServer::url("https://mcp.example.com/sse")?
//!     .name("docs")?
//!     .token("secret")
//!     .allow_tools(["search", "fetch"]);
//!
//! let toolset = server.to_toolset()?;
//! assert_eq!(toolset.mcp_server_name, "docs");
//!
//! assert!(McpServer::url("http://169.254.169.254/latest").is_err());
//! # Ok::<(), claude_conversation::Error>(())
//! ```

use crate::config::McpServerConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Hostnames and literals that always point at the local machine or cloud metadata.
const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "::1",
    "169.254.169.254",          // AWS/GCP/Azure metadata
    "metadata.google.internal", // GCP metadata
];

// ============================================================================
// URL VALIDATION
// ============================================================================

/// Validate an MCP server or media URL against SSRF targets.
///
/// Rejects, in order: blank input, unparseable URLs, schemes other than http/https,
/// block-listed hosts, and literal IPs in private, loopback, link-local or
/// unspecified ranges. Hostnames are not resolved.
pub fn validate_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("url", raw, "MCP server URL cannot be empty"));
    }

    let url = Url::parse(trimmed)
        .map_err(|_| Error::validation("url", raw, "Invalid MCP server URL format"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation(
            "url",
            raw,
            "MCP server URL must use HTTP or HTTPS protocol",
        ));
    }

    let host = url
        .host()
        .ok_or_else(|| Error::validation("url", raw, "Invalid MCP server URL format"))?;

    let host_str = match &host {
        Host::Domain(domain) => domain.to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };

    if BLOCKED_HOSTS.contains(&host_str.as_str()) {
        return Err(Error::validation(
            "url",
            raw,
            "MCP server URL cannot target local or internal hosts",
        ));
    }

    let ip = match host {
        Host::Ipv4(ip) => Some(IpAddr::V4(ip)),
        Host::Ipv6(ip) => Some(IpAddr::V6(ip)),
        Host::Domain(_) => None,
    };

    if ip.is_some_and(|ip| is_private_ip(&ip)) {
        return Err(Error::validation(
            "url",
            raw,
            "MCP server URL cannot target private IP addresses",
        ));
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(*ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();

    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
    ip.is_private()
        // 127.0.0.0/8
        || ip.is_loopback()
        // 169.254.0.0/16
        || ip.is_link_local()
        // 0.0.0.0/8
        || octets[0] == 0
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_ipv4(mapped);
    }

    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}

// ============================================================================
// SERVER
// ============================================================================

/// Which of the server's tools the model may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPolicy {
    /// Only the listed tools are enabled
    Allow(Vec<String>),
    /// Every tool except the listed ones is enabled
    Deny(Vec<String>),
}

/// An MCP server the API should connect to.
#[derive(Debug, Clone, PartialEq)]
pub struct McpServer {
    url: Url,
    raw_url: String,
    name: Option<String>,
    token: Option<String>,
    policy: Option<ToolPolicy>,
}

impl McpServer {
    /// Create a server for `url`, rejecting local, internal and private targets.
    ///
    /// The parsed form is only used for validation; requests carry `url` as given,
    /// minus surrounding whitespace.
    pub fn url(url: &str) -> Result<Self> {
        Ok(Self {
            url: validate_url(url)?,
            raw_url: url.trim().to_string(),
            name: None,
            token: None,
            policy: None,
        })
    }

    /// Build a server from a pre-registered table entry.
    ///
    /// `key` is used as the name unless the entry names the server itself.
    pub fn from_config(key: &str, config: &McpServerConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config(format!(
                "MCP server '{key}' has no URL configured"
            )));
        }

        let mut server = Self::url(&config.url)?.name(config.name.as_deref().unwrap_or(key))?;

        if let Some(token) = &config.token {
            server = server.token(token);
        }
        if let Some(tools) = &config.allowed_tools {
            server = server.allow_tools(tools);
        }
        if let Some(tools) = &config.denied_tools {
            server = server.deny_tools(tools);
        }

        Ok(server)
    }

    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation(
                "name",
                name,
                "MCP server name cannot be empty",
            ));
        }
        self.name = Some(name);
        Ok(self)
    }

    /// Bearer token sent to the server as `authorization_token`
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Enable only these tools. Replaces any earlier allow or deny list.
    pub fn allow_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_policy(ToolPolicy::Allow(
            tools.into_iter().map(|t| t.as_ref().to_string()).collect(),
        ));
        self
    }

    /// Disable these tools. Replaces any earlier allow or deny list.
    pub fn deny_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_policy(ToolPolicy::Deny(
            tools.into_iter().map(|t| t.as_ref().to_string()).collect(),
        ));
        self
    }

    fn set_policy(&mut self, policy: ToolPolicy) {
        if let Some(previous) = self.policy.replace(policy) {
            log::debug!(
                "MCP server {:?}: tool policy {:?} replaced by {:?}",
                self.name,
                previous,
                self.policy
            );
        }
    }

    pub fn get_url(&self) -> &Url {
        &self.url
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn policy(&self) -> Option<&ToolPolicy> {
        self.policy.as_ref()
    }

    fn require_name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| Error::validation("name", "", "MCP server must have a name"))
    }

    /// Server descriptor for the request's `mcp_servers` list.
    pub fn to_definition(&self) -> Result<McpServerDefinition> {
        Ok(McpServerDefinition {
            kind: "url".to_string(),
            url: self.raw_url.clone(),
            name: self.require_name()?.to_string(),
            authorization_token: self.token.clone(),
        })
    }

    /// Toolset descriptor for the request's `tools` list.
    pub fn to_toolset(&self) -> Result<McpToolset> {
        let (default_config, configs) = match &self.policy {
            None => (None, BTreeMap::new()),
            Some(ToolPolicy::Allow(tools)) => (
                Some(ToolsetConfig { enabled: false }),
                tools
                    .iter()
                    .map(|t| (t.clone(), ToolsetConfig { enabled: true }))
                    .collect(),
            ),
            Some(ToolPolicy::Deny(tools)) => (
                Some(ToolsetConfig { enabled: true }),
                tools
                    .iter()
                    .map(|t| (t.clone(), ToolsetConfig { enabled: false }))
                    .collect(),
            ),
        };

        Ok(McpToolset {
            kind: "mcp_toolset".to_string(),
            mcp_server_name: self.require_name()?.to_string(),
            default_config,
            configs,
        })
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpToolset {
    #[serde(rename = "type")]
    pub kind: String,
    pub mcp_server_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_config: Option<ToolsetConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, ToolsetConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsetConfig {
    pub enabled: bool,
}

/// Argument accepted by `ConversationBuilder::mcp`: a pre-registered name or a server.
#[derive(Debug, Clone)]
pub enum McpServerRef {
    Named(String),
    Server(McpServer),
}

impl From<&str> for McpServerRef {
    fn from(name: &str) -> Self {
        McpServerRef::Named(name.to_string())
    }
}

impl From<String> for McpServerRef {
    fn from(name: String) -> Self {
        McpServerRef::Named(name)
    }
}

impl From<McpServer> for McpServerRef {
    fn from(server: McpServer) -> Self {
        McpServerRef::Server(server)
    }
}
