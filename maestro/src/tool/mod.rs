//! Tool trait and registry.
//!
//! Tools are the only way agents touch the world. The engine owns just the
//! dispatch layer: parameter validation, error wrapping, and prompt
//! rendering. Tool bodies (file I/O, search, shell, diagnostics, MCP
//! proxies) live outside the engine and conform to the [`Tool`] trait.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::event::SharedSink;

/// Parameter type for tool schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParamType {
    /// A string value.
    String,
    /// A number.
    Number,
    /// A boolean.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
}

impl ParamType {
    /// JSON-schema type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Parameter type.
    pub ty: ParamType,
    /// Human/model-readable description.
    pub description: String,
    /// Whether the parameter must be present.
    pub required: bool,
}

impl ParamSpec {
    /// A required parameter.
    #[must_use]
    pub fn required(ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            ty,
            description: description.into(),
            required: true,
        }
    }

    /// An optional parameter.
    #[must_use]
    pub fn optional(ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            ty,
            description: description.into(),
            required: false,
        }
    }
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Root of the workspace the tool may operate in.
    pub workspace_root: PathBuf,
    /// Event sink for tool-side progress reporting.
    pub events: SharedSink,
    /// Cancellation handle; long-running tools must observe it.
    pub cancel: CancelToken,
}

impl ToolContext {
    /// Create a context rooted at `workspace_root` with a no-op sink.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            events: crate::event::noop_sink(),
            cancel: CancelToken::new(),
        }
    }

    /// Replace the event sink.
    #[must_use]
    pub fn with_events(mut self, events: SharedSink) -> Self {
        self.events = events;
        self
    }

    /// Replace the cancellation handle.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// An executable capability exposed to agents.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Globally unique tool name (snake_case).
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// Declared parameters, keyed by name. Ordered for stable prompts.
    fn params(&self) -> BTreeMap<String, ParamSpec>;

    /// Execute the tool.
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::Error::Tool`] (or any error) on
    /// failure; the registry converts it into a `success=false` outcome.
    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<String>;
}

/// Shared handle to a tool.
pub type SharedTool = Arc<dyn Tool>;

/// A tool-call request extracted from assistant output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// Tool name.
    pub tool: String,
    /// Invocation arguments.
    pub args: Map<String, Value>,
}

impl ToolCallRequest {
    /// Create a request.
    #[must_use]
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// Record of one executed tool call.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    /// Tool name.
    pub tool: String,
    /// Invocation arguments.
    pub args: Map<String, Value>,
    /// Result text (error text on failure).
    pub result: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Wall-clock execution time.
    pub duration: Duration,
}

/// Outcome of dispatching one tool call through the registry.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Result or error text.
    pub text: String,
    /// Whether the call succeeded.
    pub success: bool,
}

/// The process-wide tool dispatcher.
///
/// Fixed at startup (built-in tools plus MCP-discovered ones); lookups on
/// the hot path are read-only.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, SharedTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, tool: SharedTool) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// All registered tools, ordered by name.
    #[must_use]
    pub fn all(&self) -> Vec<SharedTool> {
        self.tools.values().cloned().collect()
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SharedTool> {
        self.tools.get(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A copy of this registry restricted to `allowed` names.
    ///
    /// An empty allow-list means no restriction.
    #[must_use]
    pub fn filtered(&self, allowed: Option<&std::collections::BTreeSet<String>>) -> Self {
        match allowed {
            None => self.clone(),
            Some(set) if set.is_empty() => self.clone(),
            Some(set) => Self {
                tools: self
                    .tools
                    .iter()
                    .filter(|(name, _)| set.contains(name.as_str()))
                    .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
                    .collect(),
            },
        }
    }

    /// Render every tool as a prompt block the model can read.
    #[must_use]
    pub fn describe_for_prompt(&self) -> String {
        let mut out = String::new();
        for tool in self.tools.values() {
            out.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
            for (name, spec) in tool.params() {
                let required = if spec.required { "required" } else { "optional" };
                out.push_str(&format!(
                    "    {name} ({}, {required}): {}\n",
                    spec.ty.as_str(),
                    spec.description,
                ));
            }
        }
        out
    }

    /// Dispatch one tool call.
    ///
    /// Validates the required-parameter set before invoking; converts any
    /// execution error into a `success=false` outcome. An unknown tool is
    /// also a `success=false` outcome, never an error — the model is
    /// expected to recover on the next turn.
    pub async fn execute(
        &self,
        name: &str,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Unknown tool requested");
            return ToolOutcome {
                text: format!("Unknown tool '{name}'"),
                success: false,
            };
        };

        let missing: Vec<String> = tool
            .params()
            .iter()
            .filter(|(param, spec)| spec.required && !args.contains_key(param.as_str()))
            .map(|(param, _)| param.clone())
            .collect();
        if !missing.is_empty() {
            return ToolOutcome {
                text: format!(
                    "Tool error ({name}): missing required parameter(s): {}",
                    missing.join(", "),
                ),
                success: false,
            };
        }

        match tool.execute(args, ctx).await {
            Ok(text) => ToolOutcome {
                text,
                success: true,
            },
            Err(err) => {
                warn!(tool = name, error = %err, "Tool execution failed");
                ToolOutcome {
                    text: format!("Tool error ({name}): {err}"),
                    success: false,
                }
            }
        }
    }
}
