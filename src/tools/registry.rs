//! Tool trait and name-keyed dispatch.
//!
//! Dispatch never propagates an error past the registry: unknown tools,
//! missing attachments, and tool failures all come back as error-tagged
//! result strings so the agent run always receives one result per call.

use crate::types::{FileRef, Result, ToolDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    /// Tools operating on the task's attachment get the ambient file id
    /// injected when the caller omitted it.
    fn requires_attachment(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Ambient state available to a dispatch: the current task's attachment.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub attachment: Option<FileRef>,
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
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

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Schema descriptors for a subset of registered tools, in the order
    /// requested. Unknown names are skipped.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// Schema descriptors for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Resolve one tool call to its output string.
    ///
    /// Every failure mode becomes an `Error:`-prefixed result rather than an
    /// `Err`, so a single failing tool never stalls or aborts the run.
    pub async fn dispatch(&self, name: &str, mut args: Value, ctx: &ToolContext) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!("Error: tool '{}' is not registered.", name);
        };

        if tool.requires_attachment() && args.get("file_id").and_then(Value::as_str).is_none() {
            match &ctx.attachment {
                Some(file) => {
                    if !args.is_object() {
                        args = Value::Object(serde_json::Map::new());
                    }
                    args["file_id"] = Value::String(file.as_str().to_string());
                }
                None => {
                    return format!(
                        "Error: tool '{}' requires an attached file, but this task has none.",
                        name
                    );
                }
            }
        }

        tracing::debug!(tool = name, "dispatching tool call");
        match tool.execute(args).await {
            Ok(Value::String(text)) => text,
            Ok(value) => value.to_string(),
            Err(e) => format!("Error: {}", e),
        }
    }
}
