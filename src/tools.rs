//! # Tool System
//!
//! Declarative tool definitions for the Claude tool-use protocol.
//!
//! ## Architecture Overview
//!
//! A [`Tool`] is built from three parts:
//!
//! 1. **Schema** - an ordered set of [`Parameter`]s plus the names that are required.
//!    It serializes to `{name, description?, input_schema: {type: object, properties, required?}}`.
//!
//! 2. **Handler** - an optional async function receiving the model's input as a JSON
//!    [`Value`]. A tool without a handler is only declared to the model; executing it
//!    is a reported error, never a panic.
//!
//! 3. **Guards** - an optional validator that inspects the input before the handler runs,
//!    and an optional per-tool timeout enforced by the executor.
//!
//! ## Tool Lifecycle
//!
//! ```text
//! 1. Definition:   tool(name, description).required_param(..).build(handler)
//! 2. Registration: ConversationBuilder::tools / ToolRegistry::add
//! 3. Invocation:   the model answers with a tool_use block
//! 4. Execution:    ToolExecutor checks input, runs the handler under its deadline
//! 5. Response:     the result goes back as a tool_result block
//! ```
//!
//! ## Examples
//!
//! ```rust,no_run
//! use claude_conversation::{tool, Parameter};
//! use serde_json::json;
//!
//! let weather = tool("get_weather", "Get current weather for a location")
//!     .required_param("location", "string", "City name")
//!     .parameter(Parameter::new("units", "string").enum_values(["celsius", "fahrenheit"]))
//!     .build(|input| async move {
//!         let location = input["location"].as_str().unwrap_or("Unknown").to_string();
//!         Ok(json!({"location": location, "temperature": 22}))
//!     });
//!
//! assert_eq!(weather.name(), "get_weather");
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for tool handler functions.
///
/// Handlers report arbitrary failures through [`anyhow::Error`]; the executor turns
/// them into `is_error` tool results so the model can react.
pub type ToolHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolOutput>> + Send>>
        + Send
        + Sync,
>;

/// Type alias for input validators run before the handler.
pub type ToolValidator = Arc<dyn Fn(&Value) -> Validation + Send + Sync>;

/// What a handler produced, already converted for transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Plain text, passed through unchanged
    Text(String),
    /// Structured output, encoded as a JSON string when sent
    Json(Value),
    /// The handler's value could not be represented as JSON
    Unencodable(String),
}

impl ToolOutput {
    /// Convert any serializable handler result.
    ///
    /// Strings stay text; everything else is kept as JSON.
    pub fn from_serialize<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::String(text)) => ToolOutput::Text(text),
            Ok(json) => ToolOutput::Json(json),
            Err(err) => ToolOutput::Unencodable(err.to_string()),
        }
    }

    /// The string placed in the tool_result content.
    pub fn into_content(self) -> Result<String> {
        match self {
            ToolOutput::Text(text) => Ok(text),
            ToolOutput::Json(json) => Ok(serde_json::to_string(&json)?),
            ToolOutput::Unencodable(reason) => Err(Error::other(reason)),
        }
    }
}

/// Outcome of a validator.
///
/// Validators may return `bool`, `String` or `&str`: `false` and any message both
/// count as a failure, with the message reported to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid,
    Rejected(String),
}

impl From<bool> for Validation {
    fn from(valid: bool) -> Self {
        if valid {
            Validation::Valid
        } else {
            Validation::Invalid
        }
    }
}

impl From<String> for Validation {
    fn from(message: String) -> Self {
        Validation::Rejected(message)
    }
}

impl From<&str> for Validation {
    fn from(message: &str) -> Self {
        Validation::Rejected(message.to_string())
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// One entry of a tool's input schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    kind: String,
    description: Option<String>,
    required: bool,
    default: Option<Value>,
    enum_values: Option<Vec<Value>>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: None,
            required: false,
            default: None,
            enum_values: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        // An empty description is the same as none
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn enum_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn to_property(&self) -> Value {
        let mut property = Map::new();
        property.insert("type".to_string(), Value::String(self.kind.clone()));
        if let Some(description) = &self.description {
            property.insert(
                "description".to_string(),
                Value::String(description.clone()),
            );
        }
        if let Some(values) = &self.enum_values {
            property.insert("enum".to_string(), Value::Array(values.clone()));
        }
        if let Some(default) = &self.default {
            property.insert("default".to_string(), default.clone());
        }
        Value::Object(property)
    }
}

// ============================================================================
// TOOL
// ============================================================================

/// Wire description of a tool, as sent in the request's `tools` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// A tool the model may call.
///
/// Cloning is cheap: handler and validator are shared behind [`Arc`].
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: Option<String>,
    parameters: Vec<Parameter>,
    handler: Option<ToolHandler>,
    validator: Option<ToolValidator>,
    timeout: Option<Duration>,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Names of required parameters, in declaration order
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Check required parameters and run the validator.
    ///
    /// Returns the message to report to the model when the input is refused.
    pub fn check_input(&self, input: &Value) -> std::result::Result<(), String> {
        for name in self.required() {
            if input.get(name).is_none() {
                return Err(format!("Required parameter '{name}' is missing"));
            }
        }

        match self.validator.as_ref().map(|validate| validate(input)) {
            None | Some(Validation::Valid) => Ok(()),
            Some(Validation::Invalid) => {
                Err(format!("Input validation failed for tool '{}'", self.name))
            }
            Some(Validation::Rejected(message)) => Err(message),
        }
    }

    /// Run the handler.
    ///
    /// Fails with [`Error::ToolExecution`] when no handler is defined or the handler
    /// itself fails. No input checks or timeouts are applied here; see
    /// [`ToolExecutor`](crate::ToolExecutor) for those.
    pub async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let handler = self.handler.as_ref().ok_or_else(|| {
            Error::tool(
                &self.name,
                format!("No handler defined for tool '{}'", self.name),
            )
        })?;

        handler(input)
            .await
            .map_err(|err| Error::tool(&self.name, err.to_string()))
    }

    /// The wire definition of this tool.
    ///
    /// An empty parameter list still yields `"properties": {}`.
    pub fn definition(&self) -> ToolDefinition {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_property()))
            .collect();

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));

        let required = self.required();
        if !required.is_empty() {
            schema.insert(
                "required".to_string(),
                Value::Array(required.into_iter().map(Value::from).collect()),
            );
        }

        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: Value::Object(schema),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("has_handler", &self.handler.is_some())
            .field("has_validator", &self.validator.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`Tool`]s. Created with [`tool`] or [`ToolBuilder::new`].
pub struct ToolBuilder {
    name: String,
    description: Option<String>,
    parameters: Vec<Parameter>,
    validator: Option<ToolValidator>,
    timeout: Option<Duration>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: Vec::new(),
            validator: None,
            timeout: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a parameter. Redeclaring a name replaces the earlier entry in place.
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        match self
            .parameters
            .iter_mut()
            .find(|existing| existing.name == parameter.name)
        {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
        self
    }

    /// Add an optional parameter of the given JSON type
    pub fn param(self, name: &str, kind: &str) -> Self {
        self.parameter(Parameter::new(name, kind))
    }

    /// Add a required parameter with a description
    pub fn required_param(self, name: &str, kind: &str, description: &str) -> Self {
        self.parameter(Parameter::new(name, kind).description(description).required())
    }

    /// Attach a validator run before the handler.
    pub fn validator<F, V>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> V + Send + Sync + 'static,
        V: Into<Validation>,
    {
        self.validator = Some(Arc::new(move |input| validator(input).into()));
        self
    }

    /// Deadline for one handler run.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Finish with a handler.
    ///
    /// The handler may return any serializable value; strings are passed through as
    /// text, anything else is JSON-encoded for the model.
    pub fn build<F, Fut, T>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + 'static,
    {
        let wrapped: ToolHandler = Arc::new(move |input| {
            let fut = handler(input);
            Box::pin(async move {
                let value = fut.await?;
                Ok(ToolOutput::from_serialize(&value))
            }) as Pin<Box<dyn Future<Output = anyhow::Result<ToolOutput>> + Send>>
        });

        let mut tool = self.declare();
        tool.handler = Some(wrapped);
        tool
    }

    /// Finish without a handler; the tool is declared to the model only.
    pub fn declare(self) -> Tool {
        Tool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            handler: None,
            validator: self.validator,
            timeout: self.timeout,
        }
    }
}

/// Start building a tool with a name and description.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name).description(description)
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Tools indexed by name, keeping registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting duplicate names.
    pub fn from_tools(tools: impl IntoIterator<Item = Tool>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.add(tool)?;
        }
        Ok(registry)
    }

    pub fn add(&mut self, tool: Tool) -> Result<()> {
        if self.get(tool.name()).is_some() {
            return Err(Error::validation(
                "tools",
                tool.name(),
                format!("Tool '{}' is already registered", tool.name()),
            ));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// The tool for `name`, only if it can actually run
    pub fn executable(&self, name: &str) -> Option<&Tool> {
        self.get(name).filter(|tool| tool.has_handler())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(Tool::definition).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
