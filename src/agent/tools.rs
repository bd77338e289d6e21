//! Tool registry and schema synthesis for the analysis agent.
//!
//! The tools the model may call form a closed set, registered once at
//! startup. Each tool declares its parameters as static [`ParamSpec`]s, and
//! the registry derives the chat-completions tool schema from those
//! declarations. A tool whose schema cannot be expressed is rejected at
//! synthesis time rather than offered to the model with a wrong schema.
//!
//! Dispatch never panics and never returns silence: every outcome, success
//! or failure, is serialized to a JSON observation string with an `error`
//! key on every failure path, so the loop can always feed the result back
//! to the model as a turn.

use crate::evaluator::{self, EvalError};
use crate::explorer::{Explorer, ExplorerError, FindOptions};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// JSON-schema kinds a tool parameter can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)] // Full JSON-schema vocabulary; the built-in tools use a subset
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Array with the JSON type name of its items.
    Array { items: &'static str },
    Object,
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array { .. } => "array",
            ParamKind::Object => "object",
        }
    }
}

/// Static description of one tool parameter. `required` mirrors "has no
/// default": optional parameters are defaulted inside the tool.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

/// Schema synthesis failures. Raised at startup, never mid-run.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate tool name '{0}' in registry")]
    DuplicateTool(String),

    #[error("tool '{tool}' declares parameter '{param}' twice")]
    DuplicateParam { tool: String, param: String },

    #[error("tool '{tool}' parameter '{param}' has unmappable item type '{items}'")]
    UnmappableType {
        tool: String,
        param: String,
        items: String,
    },
}

/// Tool-level failures, surfaced to the model as error observations.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("parameter '{name}' expects a {expected}")]
    InvalidParam {
        name: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    Explorer(#[from] ExplorerError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// One callable exposed to the model.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    /// One sentence; becomes the schema description the model reads.
    fn description(&self) -> &'static str;
    fn params(&self) -> &'static [ParamSpec];
    /// Invoked with arguments already validated against [`Self::params`].
    fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// The closed set of tools available to one agent run.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The built-in tool set over one exploration root.
    pub fn builtin(explorer: Arc<Explorer>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(FindFilesTool {
            explorer: explorer.clone(),
        }));
        registry.register(Box::new(ReadFileTool {
            explorer: explorer.clone(),
        }));
        registry.register(Box::new(PartialFileReaderTool { explorer }));
        registry.register(Box::new(CalculateTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Derive the chat-completions tool schema for every registered tool.
    pub fn synthesize_schemas(&self) -> Result<Vec<Value>, SchemaError> {
        let mut seen = HashSet::new();
        let mut schemas = Vec::with_capacity(self.tools.len());

        for tool in &self.tools {
            if !seen.insert(tool.name()) {
                return Err(SchemaError::DuplicateTool(tool.name().to_string()));
            }

            let mut properties = Map::new();
            let mut required = Vec::new();
            for spec in tool.params() {
                if properties.contains_key(spec.name) {
                    return Err(SchemaError::DuplicateParam {
                        tool: tool.name().to_string(),
                        param: spec.name.to_string(),
                    });
                }
                let mut property = json!({
                    "type": spec.kind.json_type(),
                    "description": spec.description,
                });
                if let ParamKind::Array { items } = spec.kind {
                    if !matches!(items, "string" | "integer" | "number" | "boolean" | "object") {
                        return Err(SchemaError::UnmappableType {
                            tool: tool.name().to_string(),
                            param: spec.name.to_string(),
                            items: items.to_string(),
                        });
                    }
                    property["items"] = json!({ "type": items });
                }
                properties.insert(spec.name.to_string(), property);
                if spec.required {
                    required.push(spec.name);
                }
            }

            schemas.push(json!({
                "type": "function",
                "function": {
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                }
            }));
        }

        Ok(schemas)
    }

    /// Execute one invocation and serialize the observation.
    ///
    /// Malformed argument JSON, an unknown tool name, a missing or mistyped
    /// parameter, and a tool-level failure each produce a distinct error
    /// observation; none of them aborts the caller.
    pub fn dispatch(&self, name: &str, argument_json: &str) -> String {
        let parsed: Value = match serde_json::from_str(argument_json) {
            Ok(value) => value,
            Err(e) => {
                return error_observation(&format!("invalid JSON in tool arguments: {e}"));
            }
        };
        let args = match parsed {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return error_observation(&format!(
                    "tool arguments must be a JSON object, got {}",
                    json_type_name(&other)
                ));
            }
        };

        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            return error_observation(&format!("unknown tool: {name}"));
        };

        debug!("Executing tool {} with args: {:?}", name, args);

        let result = validate_args(tool.as_ref(), &args).and_then(|_| tool.invoke(&args));
        match result {
            Ok(value) => serde_json::to_string(&value)
                .unwrap_or_else(|e| error_observation(&format!("unserializable result: {e}"))),
            Err(e) => error_observation(&e.to_string()),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn error_observation(message: &str) -> String {
    json!({ "error": message }).to_string()
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

fn validate_args(tool: &dyn Tool, args: &Map<String, Value>) -> Result<(), ToolError> {
    for spec in tool.params() {
        match args.get(spec.name) {
            None if spec.required => return Err(ToolError::MissingParam(spec.name)),
            None => {}
            Some(value) => {
                let ok = match spec.kind {
                    ParamKind::String => value.is_string(),
                    ParamKind::Integer => value.is_i64() || value.is_u64(),
                    ParamKind::Number => value.is_number(),
                    ParamKind::Boolean => value.is_boolean(),
                    ParamKind::Array { .. } => value.is_array(),
                    ParamKind::Object => value.is_object(),
                };
                if !ok {
                    return Err(ToolError::InvalidParam {
                        name: spec.name,
                        expected: spec.kind.json_type(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn str_arg<'a>(args: &'a Map<String, Value>, name: &'static str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn bool_arg(args: &Map<String, Value>, name: &'static str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn index_arg(
    args: &Map<String, Value>,
    name: &'static str,
    default: usize,
) -> Result<usize, ToolError> {
    match args.get(name) {
        None => Ok(default),
        Some(value) => value
            .as_u64()
            .map(|n| n as usize)
            .ok_or(ToolError::InvalidParam {
                name,
                expected: "non-negative integer",
            }),
    }
}

/// Render a number cleanly: integral results serialize without a decimal.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

// ── Built-in tools ──────────────────────────────────────────────────────

struct FindFilesTool {
    explorer: Arc<Explorer>,
}

const FIND_FILES_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "directory",
        kind: ParamKind::String,
        description: "Directory to search, relative to the base directory. Defaults to the base directory itself.",
        required: false,
    },
    ParamSpec {
        name: "pattern",
        kind: ParamKind::String,
        description: "Glob pattern files must match, e.g. \"*.rs\". Defaults to \"*\".",
        required: false,
    },
    ParamSpec {
        name: "respect_gitignore",
        kind: ParamKind::Boolean,
        description: "Skip files excluded by .gitignore and the default ignore rules. Defaults to true.",
        required: false,
    },
    ParamSpec {
        name: "include_hidden",
        kind: ParamKind::Boolean,
        description: "Include hidden files and directories. Defaults to false.",
        required: false,
    },
    ParamSpec {
        name: "include_subdirs",
        kind: ParamKind::Boolean,
        description: "Recurse into subdirectories. Defaults to true.",
        required: false,
    },
];

impl Tool for FindFilesTool {
    fn name(&self) -> &'static str {
        "find_all_matching_files"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern while respecting ignore rules. Use this to explore the structure of the codebase."
    }

    fn params(&self) -> &'static [ParamSpec] {
        FIND_FILES_PARAMS
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let directory = str_arg(args, "directory").unwrap_or(".");
        let dir = self.explorer.resolve(directory)?;

        let options = FindOptions {
            pattern: str_arg(args, "pattern").unwrap_or("*").to_string(),
            respect_ignore: bool_arg(args, "respect_gitignore", true),
            include_hidden: bool_arg(args, "include_hidden", false),
            recursive: bool_arg(args, "include_subdirs", true),
        };

        let entries = self.explorer.find_files_in(&dir, &options)?;
        let files: Vec<String> = entries
            .iter()
            .map(|e| e.relative.to_string_lossy().replace('\\', "/"))
            .collect();

        Ok(json!({
            "directory": directory,
            "pattern": options.pattern,
            "count": files.len(),
            "files": files,
        }))
    }
}

struct ReadFileTool {
    explorer: Arc<Explorer>,
}

const READ_FILE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "file_path",
    kind: ParamKind::String,
    description: "Path of the file to read, relative to the base directory.",
    required: true,
}];

impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the full contents of a text file. Binary files are refused."
    }

    fn params(&self) -> &'static [ParamSpec] {
        READ_FILE_PARAMS
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let file_path = str_arg(args, "file_path").ok_or(ToolError::MissingParam("file_path"))?;
        let path = self.explorer.resolve(file_path)?;
        let content = self.explorer.read_file(&path)?;
        Ok(json!({
            "file": file_path,
            "content": content,
        }))
    }
}

struct PartialFileReaderTool {
    explorer: Arc<Explorer>,
}

const PARTIAL_READ_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "file_path",
        kind: ParamKind::String,
        description: "Path of the file to read, relative to the base directory.",
        required: true,
    },
    ParamSpec {
        name: "offset",
        kind: ParamKind::Integer,
        description: "Number of lines to skip before reading. Defaults to 0.",
        required: false,
    },
    ParamSpec {
        name: "lines",
        kind: ParamKind::Integer,
        description: "Maximum number of lines to return. Defaults to 201.",
        required: false,
    },
];

impl Tool for PartialFileReaderTool {
    fn name(&self) -> &'static str {
        "partial_file_reader"
    }

    fn description(&self) -> &'static str {
        "Read a bounded window of lines from a file. Use this instead of read_file for large files."
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARTIAL_READ_PARAMS
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let file_path = str_arg(args, "file_path").ok_or(ToolError::MissingParam("file_path"))?;
        let offset = index_arg(args, "offset", 0)?;
        let lines = index_arg(args, "lines", 201)?;

        let path = self.explorer.resolve(file_path)?;
        let window = self.explorer.read_partial(&path, offset, lines)?;
        Ok(json!({
            "file": file_path,
            "offset": offset,
            "lines": window,
        }))
    }
}

struct CalculateTool;

const CALCULATE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "expression",
    kind: ParamKind::String,
    description: "Arithmetic expression to evaluate, e.g. \"2 + 2 * 3\" or \"sqrt(16)\".",
    required: true,
}];

impl Tool for CalculateTool {
    fn name(&self) -> &'static str {
        "calculate"
    }

    fn description(&self) -> &'static str {
        "Evaluate an arithmetic expression and return the result."
    }

    fn params(&self) -> &'static [ParamSpec] {
        CALCULATE_PARAMS
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let expression =
            str_arg(args, "expression").ok_or(ToolError::MissingParam("expression"))?;
        let result = evaluator::evaluate(expression)?;
        Ok(json!({
            "expression": expression,
            "result": number_value(result),
        }))
    }
}
