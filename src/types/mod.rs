use serde::{Deserialize, Serialize};

// ============= Task Types =============

/// Reference to a file held by the external completion service.
///
/// Attachments are uploaded by the caller (the server shell or the CLI);
/// the pipeline only ever sees the opaque id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef(pub String);

impl FileRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound research task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// The user's query text.
    pub query: String,
    /// Client-visible session identifier; tasks sharing an id share one
    /// dialogue thread.
    pub session_id: String,
    /// Optional attachment already uploaded to the completion service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<FileRef>,
}

// ============= Intent Analysis =============

/// Classified intent of a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Chat,
    Research,
}

/// The analyzer role's structured decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDecision {
    pub intent: Intent,
    pub analyzed_query: String,
}

// ============= Tool Types =============

/// Schema-described tool exposed to a role.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A pending tool call emitted by an in-flight run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id assigned by the completion service.
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The resolved output for one tool call, keyed by the same correlation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub output: String,
}

// ============= Report Types =============

/// The evaluator's structured research report.
///
/// String fields are required; list fields default to empty so a report that
/// legitimately has no findings or references still deserializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub executive_summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub visuals: Vec<String>,
    pub conclusion: String,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Extract the outermost JSON object from free-form model output.
///
/// Roles asked for JSON frequently wrap it in markdown fences or prose;
/// this takes the substring between the first `{` and the last `}` after
/// stripping fences. Returns `None` when no object-shaped substring exists
/// or it fails to parse.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Transport or submission failure against the completion service.
    #[error("Completion service error: {0}")]
    Completion(String),

    /// Tool-calling protocol violation (unknown tool, missing argument).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Expected structured output could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A tool implementation failed.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Artifact or file storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Completion(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
