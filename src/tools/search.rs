//! Web search tool backed by daedra (DuckDuckGo).

use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// `web_search`: read-only lookup of current information from the web.
pub struct WebSearchTool {
    max_results: usize,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self { max_results: 5 }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information. Use this for recent events or facts not found in the knowledge store."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find information on the web"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Protocol("Missing 'query' parameter".to_string()))?;

        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: self.max_results,
                ..Default::default()
            }),
        };

        match daedra::tools::search::perform_search(&search_args).await {
            Ok(response) => {
                // Flattened to the source/content prose the researcher
                // prompt expects, rather than a JSON result list.
                let formatted = response
                    .data
                    .iter()
                    .map(|r| format!("Source: {}\nContent: {} {}", r.url, r.title, r.description))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Ok(Value::String(formatted))
            }
            Err(e) => Err(AppError::Tool(format!("Web search failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_tool_definition() {
        let tool = WebSearchTool::new();
        assert_eq!(tool.name(), "web_search");
        assert!(!tool.description().is_empty());
        assert!(!tool.requires_attachment());

        let schema = tool.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["query"].is_object());
    }

    #[tokio::test]
    async fn test_search_missing_query() {
        let tool = WebSearchTool::new();
        let result = tool.execute(json!({})).await;
        assert!(result.is_err());
    }
}
