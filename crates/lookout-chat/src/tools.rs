//! Tool registry and the three data-access tools.
//!
//! Tools are keyed by `ToolKind`; names only appear at the model boundary.
//! Arguments are validated against each tool's declared `Schema` before the
//! tool runs, and every dispatch is recorded, success or not.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lookout_data::dataset::Dataset;
use lookout_data::params::ParameterSet;
use lookout_data::query::{execute, FilterOp, QuerySpec};
use lookout_data::schema::{FieldSpec, FieldType, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{ToolError, ToolErrorKind};
use crate::llm::{ToolDefinition, ToolInvocation};
use crate::session::ToolCallRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    FeedsSearch,
    EncoderGetParams,
    DecoderGetParams,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::FeedsSearch,
        ToolKind::EncoderGetParams,
        ToolKind::DecoderGetParams,
    ];

    /// Function name advertised to the model.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::FeedsSearch => "feeds_search",
            ToolKind::EncoderGetParams => "encoder_get_params",
            ToolKind::DecoderGetParams => "decoder_get_params",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A deterministic data-access operation the model may call.
///
/// `call` receives arguments that already passed `input_schema`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn description(&self) -> String;

    fn input_schema(&self) -> Schema;

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

// =============================================================================
// feeds_search
// =============================================================================

/// Filter, sort and project the feed table.
pub struct FeedsSearchTool {
    dataset: Arc<Dataset>,
}

impl FeedsSearchTool {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    fn available_columns(&self) -> Value {
        json!(self.dataset.feeds().column_names())
    }
}

/// One `{field, op, value}` predicate; `op` is restricted to `operators`.
fn predicate_spec(operators: &[&str]) -> FieldSpec {
    FieldSpec::new(FieldType::Object).properties(
        Schema::new()
            .field(
                "field",
                FieldSpec::new(FieldType::String)
                    .required()
                    .describe("Column to compare"),
            )
            .field(
                "op",
                FieldSpec::new(FieldType::String)
                    .required()
                    .one_of(operators.iter().map(|op| json!(op)).collect()),
            )
            .field(
                "value",
                FieldSpec::new(FieldType::Any)
                    .required()
                    .describe("Comparison value; an array for 'in'"),
            )
            .deny_additional(),
    )
}

#[async_trait]
impl Tool for FeedsSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FeedsSearch
    }

    fn description(&self) -> String {
        "Search camera feeds. Filters are combined with AND; results can be sorted \
         by one column, limited, and projected onto chosen columns."
            .to_string()
    }

    fn input_schema(&self) -> Schema {
        let operators: Vec<&str> = FilterOp::ALL.iter().map(|op| op.as_str()).collect();
        let columns = self.dataset.feeds().column_names().join(", ");

        Schema::new()
            .field(
                "filters",
                FieldSpec::new(FieldType::Array)
                    .items(predicate_spec(&operators))
                    .describe(format!(
                        "Predicates combined with AND. op is one of: {}. \
                         Text comparisons for eq, ne, in and contains ignore case; \
                         'in' takes an array of values.",
                        operators.join(", ")
                    )),
            )
            .field(
                "sort",
                FieldSpec::new(FieldType::Object)
                    .describe("Single sort key; ties keep the original feed order")
                    .properties(
                        Schema::new()
                            .field("key", FieldSpec::new(FieldType::String).required())
                            .field(
                                "direction",
                                FieldSpec::new(FieldType::String)
                                    .one_of(vec![json!("asc"), json!("desc")]),
                            ),
                    ),
            )
            .field(
                "columns",
                FieldSpec::new(FieldType::Array)
                    .items(FieldSpec::new(FieldType::String))
                    .describe(format!("Columns to return, in order. Available: {}", columns)),
            )
            .field(
                "limit",
                FieldSpec::new(FieldType::Integer)
                    .minimum(1.0)
                    .describe("Maximum number of rows, applied after sorting"),
            )
            .deny_additional()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let spec: QuerySpec = serde_json::from_value(Value::Object(arguments))
            .map_err(|e| ToolError::invalid_arguments(e.to_string()))?;

        let result = execute(self.dataset.feeds(), &spec).map_err(|e| {
            let unknown = e.is_unknown_name();
            let err = ToolError::from(e);
            if unknown {
                err.with_detail("available_columns", self.available_columns())
            } else {
                err
            }
        })?;

        Ok(json!({
            "data": result.rows,
            "count": result.rows.len(),
            "matched": result.matched,
            "total_feeds": result.total,
        }))
    }
}

// =============================================================================
// encoder_get_params / decoder_get_params
// =============================================================================

/// Return the encoder or decoder parameter set, optionally a named subset.
pub struct ParametersTool {
    kind: ToolKind,
    dataset: Arc<Dataset>,
}

impl ParametersTool {
    pub fn encoder(dataset: Arc<Dataset>) -> Self {
        Self {
            kind: ToolKind::EncoderGetParams,
            dataset,
        }
    }

    pub fn decoder(dataset: Arc<Dataset>) -> Self {
        Self {
            kind: ToolKind::DecoderGetParams,
            dataset,
        }
    }

    fn params(&self) -> &ParameterSet {
        match self.kind {
            ToolKind::EncoderGetParams => self.dataset.encoder(),
            _ => self.dataset.decoder(),
        }
    }

    fn side(&self) -> &'static str {
        match self.kind {
            ToolKind::EncoderGetParams => "encoder",
            _ => "decoder",
        }
    }
}

#[async_trait]
impl Tool for ParametersTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn description(&self) -> String {
        format!("Get video {} configuration parameters", self.side())
    }

    fn input_schema(&self) -> Schema {
        Schema::new()
            .field(
                "names",
                FieldSpec::new(FieldType::Array)
                    .items(FieldSpec::new(FieldType::String))
                    .describe(format!(
                        "Optional subset of parameter names. Available: {}",
                        self.params().names().join(", ")
                    )),
            )
            .deny_additional()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params = self.params();
        let values = match arguments.get("names") {
            Some(Value::Array(names)) => {
                let names: Vec<String> = names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect();
                params.project(&names).map_err(|e| {
                    ToolError::from(e).with_detail("available_parameters", json!(params.names()))
                })?
            }
            _ => params.as_map().clone(),
        };

        let mut out = Map::new();
        out.insert(format!("{}_params", self.side()), Value::Object(values));
        out.insert(
            "description".to_string(),
            json!(format!("Video {} configuration parameters", self.side())),
        );
        Ok(Value::Object(out))
    }
}

// =============================================================================
// ToolRegistry
// =============================================================================

/// Maps tool kinds to implementations.
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the three built-in tools over `dataset`.
    pub fn with_dataset(dataset: Arc<Dataset>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(FeedsSearchTool::new(dataset.clone())));
        registry.register(Box::new(ParametersTool::encoder(dataset.clone())));
        registry.register(Box::new(ParametersTool::decoder(dataset)));
        registry
    }

    /// Register a tool, replacing any existing one of the same kind.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.kind(), Arc::from(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions advertised to the model, in a stable order.
    pub fn describe(&self) -> Vec<ToolDefinition> {
        ToolKind::ALL
            .iter()
            .filter_map(|kind| self.tools.get(kind))
            .map(|tool| ToolDefinition {
                name: tool.kind().name().to_string(),
                description: tool.description(),
                parameters: tool.input_schema().to_json_schema(),
            })
            .collect()
    }

    /// Validate `arguments` against the tool's schema and run it.
    ///
    /// The tool runs on its own task so a panic inside it surfaces as
    /// `ExecutionFailed` instead of tearing down the caller.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let tool = ToolKind::from_name(name)
            .and_then(|kind| self.tools.get(&kind))
            .map(Arc::clone)
            .ok_or_else(|| ToolError::unknown_tool(name))?;

        let arguments = match arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(ToolError::invalid_arguments(format!(
                    "arguments must be a JSON object, got {}",
                    other
                )))
            }
        };

        tool.input_schema().validate(&arguments)?;
        match tokio::spawn(async move { tool.call(arguments).await }).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution aborted");
                Err(ToolError::new(
                    ToolErrorKind::ExecutionFailed,
                    format!("tool '{}' failed: {}", name, e),
                ))
            }
        }
    }

    /// Run one model-requested call and append its record to `trace`.
    ///
    /// Returns the tool-result text to send back to the model. Failures are
    /// encoded in the result, never returned as errors.
    pub async fn dispatch(
        &self,
        invocation: &ToolInvocation,
        round: u32,
        trace: &mut Vec<ToolCallRecord>,
    ) -> String {
        let (arguments, outcome) = match parse_arguments(&invocation.arguments) {
            Ok(args) => {
                let outcome = self.invoke(&invocation.name, &args).await;
                (args, outcome)
            }
            Err(err) => (Value::String(invocation.arguments.clone()), Err(err)),
        };

        let (output, is_error) = match outcome {
            Ok(value) => (value, false),
            Err(err) => {
                debug!(
                    tool = %invocation.name,
                    kind = ?err.kind,
                    error = %err,
                    "Tool call failed"
                );
                (err.to_payload(), true)
            }
        };

        debug!(
            tool = %invocation.name,
            call_id = %invocation.id,
            round,
            is_error,
            "Tool dispatched"
        );

        let content = output.to_string();
        trace.push(ToolCallRecord {
            call_id: invocation.id.clone(),
            name: invocation.name.clone(),
            arguments,
            output,
            is_error,
            round,
            position: trace.len(),
            timestamp: Utc::now(),
        });
        content
    }
}

fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| {
        ToolError::new(
            ToolErrorKind::InvalidArguments,
            format!("arguments are not valid JSON: {}", e),
        )
    })
}
