//! Tool System
//!
//! Schema-described, locally executed capabilities the model may request.
//! Tools are registered once under a unique name; the registry validates
//! model-supplied arguments against the declared schema before the handler
//! ever runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AgentError, Result, ToolCallError, ToolError, ValidationError};

/// Decoded tool arguments: name -> tagged JSON value
pub type ArgumentMap = serde_json::Map<String, Value>;

/// Declared parameter type, mirroring JSON-schema primitive types.
///
/// `Integer` and `Number` are distinct: an integer argument rejects
/// fractional values, a number accepts both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

/// One declared tool parameter with its validation rules
#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
    /// Allowed values for string parameters
    pub enum_values: Option<Vec<Value>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Item schema for array parameters
    pub items: Option<Box<Parameter>>,
    /// Declared sub-properties for object parameters
    pub properties: Option<Vec<Parameter>>,
}

impl Parameter {
    fn new(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            enum_values: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            items: None,
            properties: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    pub fn array(
        name: impl Into<String>,
        items: Option<Parameter>,
        description: impl Into<String>,
    ) -> Self {
        let mut param = Self::new(name, ParamType::Array, description);
        param.items = items.map(Box::new);
        param
    }

    pub fn object(
        name: impl Into<String>,
        properties: Vec<Parameter>,
        description: impl Into<String>,
    ) -> Self {
        let mut param = Self::new(name, ParamType::Object, description);
        param.properties = Some(properties);
        param
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn min_length(mut self, value: usize) -> Self {
        self.min_length = Some(value);
        self
    }

    pub fn max_length(mut self, value: usize) -> Self {
        self.max_length = Some(value);
        self
    }

    pub fn minimum(mut self, value: f64) -> Self {
        self.minimum = Some(value);
        self
    }

    pub fn maximum(mut self, value: f64) -> Self {
        self.maximum = Some(value);
        self
    }

    /// JSON-schema fragment for this parameter
    pub fn to_schema(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("type".into(), json!(self.kind.as_str()));
        map.insert("description".into(), json!(self.description));

        if let Some(values) = &self.enum_values {
            map.insert("enum".into(), Value::Array(values.clone()));
        }
        if let Some(n) = self.min_length {
            map.insert("minLength".into(), json!(n));
        }
        if let Some(n) = self.max_length {
            map.insert("maxLength".into(), json!(n));
        }
        if let Some(v) = self.minimum {
            map.insert("minimum".into(), json!(v));
        }
        if let Some(v) = self.maximum {
            map.insert("maximum".into(), json!(v));
        }
        if let Some(items) = &self.items {
            map.insert("items".into(), items.to_schema());
        }
        if let Some(properties) = &self.properties {
            let props: serde_json::Map<String, Value> = properties
                .iter()
                .map(|p| (p.name.clone(), p.to_schema()))
                .collect();
            let required: Vec<Value> = properties
                .iter()
                .filter(|p| p.required)
                .map(|p| Value::String(p.name.clone()))
                .collect();
            map.insert("properties".into(), Value::Object(props));
            map.insert("required".into(), Value::Array(required));
        }

        Value::Object(map)
    }
}

/// Result value produced by a tool handler.
///
/// `Json` values are serialized before being placed in a tool-result
/// message; `Text` passes through unchanged.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// Render to tool-result message content
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Text(s) => s.clone(),
            ToolOutput::Json(v) => v.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        ToolOutput::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        ToolOutput::Text(s.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(v: Value) -> Self {
        ToolOutput::Json(v)
    }
}

/// Handler trait - the narrow seam between the registry and tool logic.
///
/// Handlers receive arguments already validated against the tool's schema
/// and report failures through the returned `Result`, never by panicking.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: ArgumentMap) -> std::result::Result<ToolOutput, ToolError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ArgumentMap) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<ToolOutput, ToolError>> + Send,
{
    async fn invoke(&self, arguments: ArgumentMap) -> std::result::Result<ToolOutput, ToolError> {
        (self.0)(arguments).await
    }
}

/// Wrap an async closure as a [`ToolHandler`]
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ArgumentMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<ToolOutput, ToolError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Immutable binding of name -> schema -> handler
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    parameters: Vec<Parameter>,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<Parameter>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Argument schema: `{type: object, properties, required}`
    pub fn schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_schema()))
            .collect();
        let required: Vec<Value> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| Value::String(p.name.clone()))
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Wire-format function spec for a provider request
    pub fn to_spec(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.schema(),
            },
        })
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Registry for available tools.
///
/// Names are unique; registration order is preserved so the exported spec
/// list is stable across calls.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool.
    ///
    /// Fails with `DuplicateTool` if the name is taken; the registry is
    /// left unchanged in that case.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.tools.contains_key(tool.name()) {
            return Err(AgentError::DuplicateTool(tool.name().to_string()));
        }
        self.order.push(tool.name().to_string());
        self.tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Tool> {
        self.tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Wire-format tool specs, stable in registration order
    pub fn to_specs(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(Tool::to_spec)
            .collect()
    }

    /// Validate arguments against the tool's schema, then invoke its handler.
    ///
    /// The error kind tells bad input (`Invalid`) apart from a crashed
    /// handler (`Execution`); the handler does not run on invalid input.
    pub async fn call(
        &self,
        name: &str,
        arguments: ArgumentMap,
    ) -> std::result::Result<ToolOutput, ToolCallError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolCallError::NotFound(name.to_string()))?;

        validate_arguments(tool, &arguments)?;

        tool.handler
            .invoke(arguments)
            .await
            .map_err(|source| ToolCallError::Execution {
                name: name.to_string(),
                source,
            })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Depth-first schema walk; the first violation found is the one reported.
fn validate_arguments(
    tool: &Tool,
    arguments: &ArgumentMap,
) -> std::result::Result<(), ValidationError> {
    for param in tool.parameters() {
        if param.required && !arguments.contains_key(&param.name) {
            return Err(ValidationError::MissingRequired(param.name.clone()));
        }
    }

    for (key, value) in arguments {
        let Some(param) = tool.parameters().iter().find(|p| &p.name == key) else {
            return Err(ValidationError::UnknownParameter(key.clone()));
        };
        validate_value(value, param, key)?;
    }

    Ok(())
}

fn validate_value(
    value: &Value,
    param: &Parameter,
    path: &str,
) -> std::result::Result<(), ValidationError> {
    let mismatch = |expected: &'static str| ValidationError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: json_type_name(value),
    };
    let constraint = |reason: &str| ValidationError::Constraint {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    match param.kind {
        ParamType::String => {
            let Some(s) = value.as_str() else {
                return Err(mismatch("string"));
            };
            let length = s.chars().count();
            if param.min_length.is_some_and(|min| length < min) {
                return Err(constraint("String too short"));
            }
            if param.max_length.is_some_and(|max| length > max) {
                return Err(constraint("String too long"));
            }
            if let Some(allowed) = &param.enum_values {
                if !allowed.contains(value) {
                    return Err(constraint("Invalid enum value"));
                }
            }
        }
        ParamType::Integer => {
            if !value.is_i64() && !value.is_u64() {
                return Err(mismatch("integer"));
            }
            check_bounds(value, param, &constraint)?;
        }
        ParamType::Number => {
            if value.as_f64().is_none() {
                return Err(mismatch("number"));
            }
            check_bounds(value, param, &constraint)?;
        }
        ParamType::Boolean => {
            if !value.is_boolean() {
                return Err(mismatch("boolean"));
            }
        }
        ParamType::Array => {
            let Some(items) = value.as_array() else {
                return Err(mismatch("array"));
            };
            if let Some(item_schema) = &param.items {
                for (i, item) in items.iter().enumerate() {
                    validate_value(item, item_schema, &format!("{path}[{i}]"))?;
                }
            }
        }
        ParamType::Object => {
            let Some(object) = value.as_object() else {
                return Err(mismatch("object"));
            };
            if let Some(properties) = &param.properties {
                for (key, sub_value) in object {
                    let sub_path = format!("{path}.{key}");
                    let Some(sub_param) = properties.iter().find(|p| &p.name == key) else {
                        return Err(ValidationError::UnknownParameter(sub_path));
                    };
                    validate_value(sub_value, sub_param, &sub_path)?;
                }
                for sub_param in properties {
                    if sub_param.required && !object.contains_key(&sub_param.name) {
                        return Err(ValidationError::MissingRequired(format!(
                            "{path}.{}",
                            sub_param.name
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

fn check_bounds(
    value: &Value,
    param: &Parameter,
    constraint: &impl Fn(&str) -> ValidationError,
) -> std::result::Result<(), ValidationError> {
    let number = value.as_f64().unwrap_or_default();
    if param.minimum.is_some_and(|min| number < min) {
        return Err(constraint("Value too small"));
    }
    if param.maximum.is_some_and(|max| number > max) {
        return Err(constraint("Value too large"));
    }
    Ok(())
}
