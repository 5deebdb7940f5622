//! External completion-service contract.
//!
//! The pipeline drives an assistants-style conversational completion service:
//! persistent threads, role-bound runs, mid-run tool calls, and message
//! retrieval. Everything behind [`CompletionBackend`] is an external
//! collaborator; the core depends only on this contract.

pub mod openai;

use crate::types::{FileRef, Result, ToolCallRequest, ToolCallResult, ToolDefinition};
use async_trait::async_trait;

pub use openai::{OpenAiBackend, OpenAiImageGenerator};

/// Opaque reference to a persistent multi-turn dialogue context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle(pub String);

/// One execution attempt of a role against a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle(pub String);

/// Observable state of an in-flight run.
#[derive(Debug, Clone)]
pub enum RunState {
    /// Queued, in progress, or cancelling; keep polling.
    InFlight,
    /// The run is blocked on tool results; every pending call must receive
    /// exactly one result before it can progress.
    RequiresToolResolution(Vec<ToolCallRequest>),
    /// The run produced a final message.
    Completed,
    /// The run ended without a final message (failed, cancelled, expired).
    /// Carries the provider's status string.
    Terminal(String),
}

/// A named agent configuration bound to one pipeline stage.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    /// Function tools the role may call mid-run.
    pub tools: Vec<ToolDefinition>,
    /// Whether the provider's code-interpreter tool is enabled.
    pub code_interpreter: bool,
    /// Whether the provider's file-search tool is enabled.
    pub file_search: bool,
    /// Constrain the final message to a JSON object.
    pub json_response: bool,
}

/// The latest role-authored message of a thread.
#[derive(Debug, Clone, Default)]
pub struct AssistantMessage {
    /// Concatenated text content.
    pub text: String,
    /// File ids of any generated artifacts attached to the message.
    pub file_refs: Vec<String>,
}

/// Contract with the external conversational-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Create a fresh persistent thread.
    async fn create_thread(&self) -> Result<ThreadHandle>;

    /// Append a user message, forwarding the attachment when present.
    async fn add_user_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
        attachment: Option<&FileRef>,
    ) -> Result<()>;

    /// Start a run of the given role against the thread.
    async fn start_run(&self, thread: &ThreadHandle, role: &RoleSpec) -> Result<RunHandle>;

    /// Check the current state of a run.
    async fn run_state(&self, thread: &ThreadHandle, run: &RunHandle) -> Result<RunState>;

    /// Submit one result per pending tool call, atomically.
    async fn submit_tool_outputs(
        &self,
        thread: &ThreadHandle,
        run: &RunHandle,
        outputs: Vec<ToolCallResult>,
    ) -> Result<()>;

    /// Retrieve the most recent role-authored message.
    async fn latest_assistant_message(&self, thread: &ThreadHandle) -> Result<AssistantMessage>;

    /// Download the raw bytes of a file held by the service.
    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Describe the content of an image file held by the service.
    async fn describe_image(&self, file_id: &str, prompt: &str) -> Result<String>;
}
