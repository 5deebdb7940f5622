use crate::types::{AppError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration, loaded from the environment.
///
/// Only `DELPHI_OPENAI_API_KEY` is required when using the OpenAI backend;
/// everything else has a sensible default.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// API key for the completion/image services.
    pub api_key: String,
    /// Base URL of the completion service.
    pub api_base: String,
    /// Model used for every role.
    pub model: String,
    /// Delay between run-status polls.
    pub poll_interval: Duration,
    /// Upper bound on the polling loop of a single stage. When exceeded the
    /// stage yields a timeout failure instead of polling forever.
    pub stage_timeout: Duration,
    /// Directory where generated visuals are persisted.
    pub artifact_dir: PathBuf,
    /// Public path prefix under which artifacts are served.
    pub artifact_base_path: String,
    /// Number of snippets returned by knowledge queries.
    pub knowledge_top_k: usize,
    /// Chunk size (characters) for document ingestion.
    pub chunk_size: usize,
    /// Chunk overlap (characters) for document ingestion.
    pub chunk_overlap: usize,
    /// When true, a failed research stage feeds its failure text into the
    /// next stage instead of aborting the task. The chat branch always
    /// hard-fails regardless of this flag.
    pub continue_on_stage_failure: bool,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(PipelineConfig {
            api_key: env::var("DELPHI_OPENAI_API_KEY")
                .map_err(|_| AppError::Config("DELPHI_OPENAI_API_KEY is not set".to_string()))?,
            api_base: env::var("DELPHI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("DELPHI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            poll_interval: Duration::from_millis(parse_or("DELPHI_POLL_INTERVAL_MS", 1000)),
            stage_timeout: Duration::from_secs(parse_or("DELPHI_STAGE_TIMEOUT_SECS", 300)),
            artifact_dir: PathBuf::from(
                env::var("DELPHI_ARTIFACT_DIR").unwrap_or_else(|_| "public/files".to_string()),
            ),
            artifact_base_path: env::var("DELPHI_ARTIFACT_BASE_PATH")
                .unwrap_or_else(|_| "/files".to_string()),
            knowledge_top_k: parse_or("DELPHI_KNOWLEDGE_TOP_K", 3) as usize,
            chunk_size: parse_or("DELPHI_CHUNK_SIZE", 1000) as usize,
            chunk_overlap: parse_or("DELPHI_CHUNK_OVERLAP", 200) as usize,
            continue_on_stage_failure: env::var("DELPHI_CONTINUE_ON_STAGE_FAILURE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            poll_interval: Duration::from_secs(1),
            stage_timeout: Duration::from_secs(300),
            artifact_dir: PathBuf::from("public/files"),
            artifact_base_path: "/files".to_string(),
            knowledge_top_k: 3,
            chunk_size: 1000,
            chunk_overlap: 200,
            continue_on_stage_failure: true,
        }
    }
}

fn parse_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
