//! Knowledge-store ingestion and query tools.
//!
//! These are the tools the planner and researcher roles call mid-run:
//! `add_text_to_store` and `knowledge_query` work directly against the
//! store, while `process_document` and `analyze_image` pull the task's
//! attachment through the completion backend before ingesting it.

use crate::completion::CompletionBackend;
use crate::knowledge::KnowledgeStore;
use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use text_splitter::{ChunkConfig, TextSplitter};

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Protocol(format!("Missing '{}' parameter", key)))
}

/// `add_text_to_store`: index a free-text snippet.
pub struct AddTextTool {
    store: Arc<dyn KnowledgeStore>,
}

impl AddTextTool {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddTextTool {
    fn name(&self) -> &str {
        "add_text_to_store"
    }

    fn description(&self) -> &str {
        "Store a piece of text in the knowledge base for later semantic retrieval."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to store"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let text = required_str(&args, "text")?;
        self.store.add(text).await?;
        Ok(Value::String(
            "Text stored in the knowledge base.".to_string(),
        ))
    }
}

/// `knowledge_query`: top-k semantic lookup. Read-only.
pub struct KnowledgeQueryTool {
    store: Arc<dyn KnowledgeStore>,
    top_k: usize,
}

impl KnowledgeQueryTool {
    pub fn new(store: Arc<dyn KnowledgeStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }
}

#[async_trait]
impl Tool for KnowledgeQueryTool {
    fn name(&self) -> &str {
        "knowledge_query"
    }

    fn description(&self) -> &str {
        "Retrieve the most relevant snippets from the knowledge base for a query."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up in the knowledge base"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let query = required_str(&args, "query")?;
        let snippets = self.store.query(query, self.top_k).await?;
        Ok(Value::String(snippets.join("\n\n")))
    }
}

/// `process_document`: fetch the attached document, chunk it, and ingest
/// every chunk into the knowledge store.
pub struct ProcessDocumentTool {
    backend: Arc<dyn CompletionBackend>,
    store: Arc<dyn KnowledgeStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ProcessDocumentTool {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        store: Arc<dyn KnowledgeStore>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            backend,
            store,
            chunk_size,
            chunk_overlap,
        }
    }
}

#[async_trait]
impl Tool for ProcessDocumentTool {
    fn name(&self) -> &str {
        "process_document"
    }

    fn description(&self) -> &str {
        "Fetch the attached document, split it into chunks, and store them in the knowledge base."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_id": {
                    "type": "string",
                    "description": "Id of the attached document. Defaults to the task's attachment."
                }
            }
        })
    }

    fn requires_attachment(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let file_id = required_str(&args, "file_id")?;
        let bytes = self.backend.fetch_file(file_id).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let chunk_config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| AppError::Tool(format!("Invalid chunking config: {}", e)))?;
        let splitter = TextSplitter::new(chunk_config);

        let chunks: Vec<&str> = splitter.chunks(&text).collect();
        let mut stored = 0usize;
        for chunk in chunks {
            self.store.add(chunk).await?;
            stored += 1;
        }
        tracing::info!(file_id, chunks = stored, "document ingested");
        Ok(Value::String(format!(
            "Document processed: {} chunks stored in the knowledge base.",
            stored
        )))
    }
}

/// `analyze_image`: describe the attached image and ingest the description.
pub struct AnalyzeImageTool {
    backend: Arc<dyn CompletionBackend>,
    store: Arc<dyn KnowledgeStore>,
}

impl AnalyzeImageTool {
    pub fn new(backend: Arc<dyn CompletionBackend>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { backend, store }
    }
}

#[async_trait]
impl Tool for AnalyzeImageTool {
    fn name(&self) -> &str {
        "analyze_image"
    }

    fn description(&self) -> &str {
        "Describe the content of the attached image and store the description in the knowledge base."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_id": {
                    "type": "string",
                    "description": "Id of the attached image. Defaults to the task's attachment."
                }
            }
        })
    }

    fn requires_attachment(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let file_id = required_str(&args, "file_id")?;
        let description = self
            .backend
            .describe_image(
                file_id,
                "Describe this image in detail, including any text, data, or notable elements.",
            )
            .await?;
        self.store.add(&description).await?;
        Ok(Value::String(description))
    }
}
