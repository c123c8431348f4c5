//! Tool trait: The abstraction over agent capabilities.
//!
//! A tool is a named, schema-described unit of work with typed arguments and a
//! typed result. Tools are registered in a [`ToolRegistry`] and can only be
//! run through [`crate::environment::ToolEnvironment`]: the execution entry
//! point takes a [`ToolPermit`], and only the environment can mint one.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;
use crate::message::Message;

// ── Descriptors ───────────────────────────────────────────────────────────

/// The declared type of a tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolParameterType {
    String,
    Integer,
    Float,
    Boolean,
    Enum {
        values: Vec<String>,
    },
    List {
        items: Box<ToolParameterType>,
    },
    Object {
        properties: Vec<ToolParameter>,
        #[serde(default)]
        required: Vec<String>,
    },
}

/// A single named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, description: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
        }
    }
}

/// Name, description and parameter list of a tool.
///
/// Used both for the LLM-facing schema and for runtime argument validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required_parameters: Vec<ToolParameter>,
    #[serde(default)]
    pub optional_parameters: Vec<ToolParameter>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_parameters: Vec::new(),
            optional_parameters: Vec::new(),
        }
    }

    pub fn required(mut self, parameter: ToolParameter) -> Self {
        self.required_parameters.push(parameter);
        self
    }

    pub fn optional(mut self, parameter: ToolParameter) -> Self {
        self.optional_parameters.push(parameter);
        self
    }

    /// JSON Schema for the tool's arguments object.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for p in self.required_parameters.iter().chain(&self.optional_parameters) {
            properties.insert(p.name.clone(), parameter_schema(p));
        }
        let required: Vec<&str> = self.required_parameters.iter().map(|p| p.name.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check an arguments object against the declared parameters.
    ///
    /// Unknown keys are tolerated; `null` counts as absent.
    pub fn validate_args(&self, args: &serde_json::Value) -> Result<(), String> {
        let obj = args
            .as_object()
            .ok_or_else(|| format!("arguments must be a JSON object, got {}", json_kind(args)))?;

        for p in &self.required_parameters {
            match obj.get(&p.name) {
                None | Some(serde_json::Value::Null) => {
                    return Err(format!("missing required parameter `{}`", p.name));
                }
                Some(v) => check_type(&p.name, &p.param_type, v)?,
            }
        }
        for p in &self.optional_parameters {
            if let Some(v) = obj.get(&p.name).filter(|v| !v.is_null()) {
                check_type(&p.name, &p.param_type, v)?;
            }
        }
        Ok(())
    }
}

fn parameter_schema(p: &ToolParameter) -> serde_json::Value {
    let mut schema = type_schema(&p.param_type);
    if let Some(obj) = schema.as_object_mut() {
        obj.insert("description".into(), serde_json::Value::String(p.description.clone()));
    }
    schema
}

fn type_schema(t: &ToolParameterType) -> serde_json::Value {
    match t {
        ToolParameterType::String => serde_json::json!({"type": "string"}),
        ToolParameterType::Integer => serde_json::json!({"type": "integer"}),
        ToolParameterType::Float => serde_json::json!({"type": "number"}),
        ToolParameterType::Boolean => serde_json::json!({"type": "boolean"}),
        ToolParameterType::Enum { values } => serde_json::json!({"type": "string", "enum": values}),
        ToolParameterType::List { items } => serde_json::json!({"type": "array", "items": type_schema(items)}),
        ToolParameterType::Object { properties, required } => {
            let props: serde_json::Map<String, serde_json::Value> = properties
                .iter()
                .map(|p| (p.name.clone(), parameter_schema(p)))
                .collect();
            serde_json::json!({"type": "object", "properties": props, "required": required})
        }
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn check_type(path: &str, expected: &ToolParameterType, v: &serde_json::Value) -> Result<(), String> {
    let ok = match expected {
        ToolParameterType::String => v.is_string(),
        ToolParameterType::Integer => v.is_i64() || v.is_u64(),
        ToolParameterType::Float => v.is_number(),
        ToolParameterType::Boolean => v.is_boolean(),
        ToolParameterType::Enum { values } => {
            let Some(s) = v.as_str() else {
                return Err(format!("`{path}` must be one of {values:?}, got {}", json_kind(v)));
            };
            if !values.iter().any(|allowed| allowed == s) {
                return Err(format!("`{path}` must be one of {values:?}, got \"{s}\""));
            }
            true
        }
        ToolParameterType::List { items } => {
            let Some(arr) = v.as_array() else {
                return Err(format!("`{path}` must be an array, got {}", json_kind(v)));
            };
            for (i, item) in arr.iter().enumerate() {
                check_type(&format!("{path}[{i}]"), items, item)?;
            }
            true
        }
        ToolParameterType::Object { properties, required } => {
            let Some(obj) = v.as_object() else {
                return Err(format!("`{path}` must be an object, got {}", json_kind(v)));
            };
            for name in required {
                if obj.get(name).is_none_or(|v| v.is_null()) {
                    return Err(format!("`{path}.{name}` is required"));
                }
            }
            for p in properties {
                if let Some(inner) = obj.get(&p.name).filter(|v| !v.is_null()) {
                    check_type(&format!("{path}.{}", p.name), &p.param_type, inner)?;
                }
            }
            true
        }
    };
    if ok {
        Ok(())
    } else {
        Err(format!("`{path}` has wrong type: got {}", json_kind(v)))
    }
}

// ── Calls and results ─────────────────────────────────────────────────────

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id as assigned by the LLM; absent for some providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name of the tool to execute
    pub tool: String,

    /// Arguments as a JSON value
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: Option<String>, tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id,
            tool: tool.into(),
            args,
        }
    }

    /// Extract a call from a tool-call message.
    ///
    /// Arguments that are not valid JSON are kept as a raw string so that
    /// argument validation reports them instead of the call disappearing.
    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::ToolCall { id, tool, content, .. } => {
                let args = serde_json::from_str(content)
                    .unwrap_or_else(|_| serde_json::Value::String(content.clone()));
                Some(Self::new(id.clone(), tool.clone(), args))
            }
            _ => None,
        }
    }

    pub fn to_message(&self) -> Message {
        Message::tool_call(self.id.clone(), &self.tool, &self.args)
    }
}

/// How a tool call ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        value: serde_json::Value,
        text: String,
    },
    /// Argument decoding or tool-declared validation failed.
    ValidationError {
        message: String,
    },
    /// The tool body failed unexpectedly.
    Failure {
        message: String,
    },
}

/// The result of one tool call, tagged with the originating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tool: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call: &ToolCall, value: serde_json::Value, text: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            tool: call.tool.clone(),
            outcome: ToolOutcome::Success { value, text: text.into() },
        }
    }

    pub fn validation_error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            tool: call.tool.clone(),
            outcome: ToolOutcome::ValidationError { message: message.into() },
        }
    }

    pub fn failure(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            tool: call.tool.clone(),
            outcome: ToolOutcome::Failure { message: message.into() },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    /// Human-readable text suitable for the message history.
    ///
    /// Error messages are expected to name the tool already.
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { text, .. } => text.clone(),
            ToolOutcome::ValidationError { message } | ToolOutcome::Failure { message } => message.clone(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::tool_result(self.id.clone(), &self.tool, self.content())
    }
}

// ── The Tool trait ────────────────────────────────────────────────────────

/// Capability required to run a tool body.
///
/// Only the tool environment constructs permits, so a tool cannot be executed
/// without its lifecycle hooks, error shaping and result encoding.
#[derive(Debug)]
pub struct ToolPermit {
    _private: (),
}

impl ToolPermit {
    pub(crate) fn issue() -> Self {
        Self { _private: () }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    fn descriptor(&self) -> ToolDescriptor;

    /// Tool-declared validation of decoded arguments.
    fn validate(&self, _args: &Self::Args) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, args: Self::Args, permit: &ToolPermit) -> Result<Self::Output, ToolError>;

    /// Text form of a result, fed back into the history.
    ///
    /// Strings are used as-is; everything else is compact JSON.
    fn encode_result(&self, output: &Self::Output) -> Result<String, serde_json::Error> {
        match serde_json::to_value(output)? {
            serde_json::Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

/// Arguments decoded for a specific tool, ready to run.
pub struct DecodedArgs(Box<dyn Any + Send>);

/// Object-safe view of a [`Tool`], used by the registry.
#[async_trait]
pub trait DynTool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Validate and decode raw arguments.
    fn decode(&self, args: &serde_json::Value) -> Result<DecodedArgs, ToolError>;

    /// Run the tool body and encode its result as `(value, text)`.
    async fn run(&self, args: DecodedArgs, permit: &ToolPermit) -> Result<(serde_json::Value, String), ToolError>;
}

struct TypedTool<T: Tool> {
    tool: T,
    descriptor: ToolDescriptor,
}

#[async_trait]
impl<T: Tool> DynTool for TypedTool<T> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn decode(&self, args: &serde_json::Value) -> Result<DecodedArgs, ToolError> {
        let tool_name = &self.descriptor.name;
        self.descriptor
            .validate_args(args)
            .map_err(|reason| ToolError::InvalidArguments {
                tool_name: tool_name.clone(),
                reason,
            })?;
        let typed: T::Args = serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments {
            tool_name: tool_name.clone(),
            reason: e.to_string(),
        })?;
        self.tool.validate(&typed).map_err(|reason| ToolError::Validation {
            tool_name: tool_name.clone(),
            reason,
        })?;
        Ok(DecodedArgs(Box::new(typed)))
    }

    async fn run(&self, args: DecodedArgs, permit: &ToolPermit) -> Result<(serde_json::Value, String), ToolError> {
        let tool_name = &self.descriptor.name;
        let typed = args.0.downcast::<T::Args>().map_err(|_| ToolError::ExecutionFailed {
            tool_name: tool_name.clone(),
            reason: "arguments were decoded for a different tool".into(),
        })?;
        let output = self.tool.execute(*typed, permit).await?;
        let encoding_error = |e: serde_json::Error| ToolError::Encoding {
            tool_name: tool_name.clone(),
            reason: e.to_string(),
        };
        let value = serde_json::to_value(&output).map_err(encoding_error)?;
        let text = self.tool.encode_result(&output).map_err(encoding_error)?;
        Ok((value, text))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// A registry of available tools, keyed by unique name.
///
/// Read-only once a run starts; share it behind an `Arc`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn DynTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name exists.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), ToolError> {
        let descriptor = tool.descriptor();
        if self.tools.contains_key(&descriptor.name) {
            return Err(ToolError::Duplicate(descriptor.name));
        }
        self.tools
            .insert(descriptor.name.clone(), Arc::new(TypedTool { tool, descriptor }));
        Ok(())
    }

    /// Builder-style registration.
    pub fn with<T: Tool>(mut self, tool: T) -> Result<Self, ToolError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynTool>> {
        self.tools.get(name).cloned()
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut defs: Vec<ToolDescriptor> = self.tools.values().map(|t| t.descriptor().clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
