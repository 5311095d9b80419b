//! Error types for the conversation layer
//!
//! Every fallible operation in the crate returns [`Result<T>`]. The variants map to
//! the failure classes a caller has to tell apart:
//!
//! - [`Error::Configuration`]: missing credentials or setup, fatal and never retried
//! - [`Error::Validation`]: a builder or tool input broke a declared constraint
//! - [`Error::ToolExecution`]: a tool handler failed, timed out or has no handler
//! - [`Error::Api`]: raised by the message API collaborator
//! - [`Error::Streaming`]: wraps any failure while opening or reading an event stream

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of failures reported by the message API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The API could not be reached
    Connection,
    /// Credentials were rejected
    Authentication,
    /// Too many requests
    RateLimit,
    /// The request was malformed (4xx other than auth/rate limit)
    InvalidRequest,
    /// The API failed on its side (5xx, overloaded)
    Server,
    /// Anything else
    Other,
}

impl ApiErrorKind {
    /// Wire-style name of the kind, e.g. `"rate_limit_error"`
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::Connection => "connection_error",
            ApiErrorKind::Authentication => "authentication_error",
            ApiErrorKind::RateLimit => "rate_limit_error",
            ApiErrorKind::InvalidRequest => "invalid_request_error",
            ApiErrorKind::Server => "api_error",
            ApiErrorKind::Other => "unknown_error",
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value violated a declared constraint
    #[error("Invalid {field} '{value}': {message}")]
    Validation {
        field: String,
        value: String,
        message: String,
    },

    /// A tool handler failed
    #[error("{message}")]
    ToolExecution { tool: String, message: String },

    /// Error reported by the message API
    #[error("API error ({kind}): {message}")]
    Api {
        kind: ApiErrorKind,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Failure establishing or reading an event stream
    #[error("{message}")]
    Streaming {
        message: String,
        #[source]
        source: Box<Error>,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a validation error for `field` holding `value`
    pub fn validation(
        field: impl Into<String>,
        value: impl std::fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation {
            field: field.into(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create an API error of the given kind
    pub fn api(kind: ApiErrorKind, msg: impl Into<String>) -> Self {
        Error::Api {
            kind,
            message: msg.into(),
            retry_after: None,
        }
    }

    /// Create a rate limit error with an optional server-provided delay
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Error::Api {
            kind: ApiErrorKind::RateLimit,
            message: "Rate limit exceeded. Please retry later.".to_string(),
            retry_after,
        }
    }

    /// Wrap `source` as a streaming failure
    pub fn streaming(msg: impl Into<String>, source: Error) -> Self {
        Error::Streaming {
            message: msg.into(),
            source: Box::new(source),
        }
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// The API error kind, if this is an API error
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Error::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Field name carried by a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
