//! MCP tool adapter.
//!
//! Wraps the tools of a connected MCP server as engine [`Tool`]s so the
//! ReAct driver can call them like built-ins. Transport and process
//! management stay in `rmcp`; the engine only owns the adaptation:
//! namespacing (`mcp_<server>_<tool>`), schema flattening into
//! [`ParamSpec`]s, and text extraction from call results.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, Tool as McpToolInfo};
use rmcp::service::ServerSink;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::tool::{ParamSpec, ParamType, SharedTool, Tool, ToolContext};

/// One MCP server tool exposed through the engine's [`Tool`] trait.
pub struct McpTool {
    name: String,
    description: String,
    params: BTreeMap<String, ParamSpec>,
    remote_name: String,
    sink: ServerSink,
}

impl std::fmt::Debug for McpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.name)
            .field("remote_name", &self.remote_name)
            .finish()
    }
}

impl McpTool {
    /// Wrap one server tool under the `mcp_<server>_<tool>` namespace.
    #[must_use]
    pub fn new(server: &str, info: &McpToolInfo, sink: ServerSink) -> Self {
        let remote_name = info.name.to_string();
        Self {
            name: format!("mcp_{server}_{remote_name}"),
            description: info
                .description
                .as_deref()
                .unwrap_or("MCP server tool")
                .to_owned(),
            params: params_from_schema(info.input_schema.as_ref()),
            remote_name,
            sink,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn params(&self) -> BTreeMap<String, ParamSpec> {
        self.params.clone()
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<String> {
        ctx.cancel.check()?;
        let result = self
            .sink
            .call_tool(CallToolRequestParams {
                meta: None,
                name: self.remote_name.clone().into(),
                arguments: Some(args.clone()),
            })
            .await
            .map_err(|e| Error::tool(&self.name, e.to_string()))?;

        if result.is_error.unwrap_or(false) {
            return Err(Error::tool(&self.name, flatten_content(&result.content)));
        }
        Ok(flatten_content(&result.content))
    }
}

/// Flatten MCP text content blocks into one string.
fn flatten_content(content: &[rmcp::model::Content]) -> String {
    content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert a JSON-schema object into the engine's parameter table.
fn params_from_schema(schema: &Map<String, Value>) -> BTreeMap<String, ParamSpec> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut params = BTreeMap::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return params;
    };
    for (name, prop) in properties {
        let ty = match prop.get("type").and_then(Value::as_str) {
            Some("number" | "integer") => ParamType::Number,
            Some("boolean") => ParamType::Boolean,
            Some("array") => ParamType::Array,
            Some("object") => ParamType::Object,
            _ => ParamType::String,
        };
        let description = prop
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let spec = if required.contains(&name.as_str()) {
            ParamSpec::required(ty, description)
        } else {
            ParamSpec::optional(ty, description)
        };
        params.insert(name.clone(), spec);
    }
    params
}

/// List a connected server's tools and wrap each for the engine.
///
/// # Errors
///
/// Returns [`Error::Tool`] when the server's tool listing fails.
pub async fn discover_tools(server: &str, sink: ServerSink) -> Result<Vec<SharedTool>> {
    let listing = sink
        .list_tools(Default::default())
        .await
        .map_err(|e| Error::tool(format!("mcp_{server}"), e.to_string()))?;

    let tools: Vec<SharedTool> = listing
        .tools
        .iter()
        .map(|info| Arc::new(McpTool::new(server, info, sink.clone())) as SharedTool)
        .collect();

    if tools.is_empty() {
        warn!(server, "MCP server exposes no tools");
    } else {
        info!(server, count = tools.len(), "Discovered MCP tools");
    }
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_from_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path"},
                "limit": {"type": "integer"},
            },
            "required": ["path"],
        });
        let params = params_from_schema(schema.as_object().unwrap());
        assert_eq!(params.len(), 2);
        assert!(params["path"].required);
        assert_eq!(params["path"].ty, ParamType::String);
        assert!(!params["limit"].required);
        assert_eq!(params["limit"].ty, ParamType::Number);
    }

    #[test]
    fn test_params_from_schema_without_properties() {
        let schema = json!({"type": "object"});
        assert!(params_from_schema(schema.as_object().unwrap()).is_empty());
    }
}
