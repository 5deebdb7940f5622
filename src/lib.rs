//! # Delphi - Multi-Agent Deep Research Pipeline
//!
//! A research pipeline that routes a user query through a fixed cast of
//! LLM-backed roles. An analyzer classifies intent; chat questions get a
//! direct answer, research questions flow through planning, tool-assisted
//! research, optional visual generation, and a final structured report.
//!
//! ## Overview
//!
//! Delphi can be used in two ways:
//!
//! 1. **As a CLI** - Run the `delphi` binary against a query
//! 2. **As a library** - Embed the [`Orchestrator`] in your own service
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use delphi::{
//!     InMemoryKnowledgeStore, OpenAiBackend, OpenAiImageGenerator, Orchestrator,
//!     PipelineConfig, TaskRequest,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> delphi::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let backend = Arc::new(OpenAiBackend::new(
//!         config.api_key.clone(),
//!         config.api_base.clone(),
//!     ));
//!     let knowledge = Arc::new(InMemoryKnowledgeStore::new(backend.clone()));
//!     let images = Arc::new(OpenAiImageGenerator::new(
//!         config.api_key.clone(),
//!         config.api_base.clone(),
//!     ));
//!     let orchestrator = Arc::new(Orchestrator::new(backend, knowledge, images, config));
//!
//!     let mut events = orchestrator.spawn_task(TaskRequest {
//!         query: "Compare the last three Mars rover missions".to_string(),
//!         session_id: "demo".to_string(),
//!         attachment: None,
//!     });
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event.sse_frame());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`orchestrator`] - The pipeline state machine
//! - [`runner`] - Polling protocol engine for one role invocation
//! - [`completion`] - Completion-backend trait and the OpenAI implementation
//! - [`tools`] - Tool trait, registry, and the built-in tools
//! - [`knowledge`] - Embedding-backed in-memory knowledge store
//! - [`visuals`] - Visual decision parsing and artifact persistence
//! - [`session`] - Session-to-thread continuity
//! - [`events`] - Progress event stream and SSE rendering
//! - [`roles`] - The role catalogue
//! - [`types`] - Common types and error handling

/// Completion-backend abstraction and the OpenAI implementation.
pub mod completion;
/// Environment-driven pipeline configuration.
pub mod config;
/// Progress events and their SSE rendering.
pub mod events;
/// Embedding-backed knowledge store.
pub mod knowledge;
/// The pipeline state machine.
pub mod orchestrator;
/// The role catalogue: one agent configuration per stage.
pub mod roles;
/// Polling protocol engine that drives one role invocation.
pub mod runner;
/// Session-to-thread continuity.
pub mod session;
/// Tool trait, registry, and built-in tools.
pub mod tools;
/// Core types (requests, reports, errors).
pub mod types;
/// Visual generation stage.
pub mod visuals;

// Re-export commonly used types
pub use completion::{CompletionBackend, OpenAiBackend, OpenAiImageGenerator, RoleSpec};
pub use config::PipelineConfig;
pub use events::{EventEmitter, PipelineEvent};
pub use knowledge::{EmbeddingProvider, InMemoryKnowledgeStore, KnowledgeStore};
pub use orchestrator::Orchestrator;
pub use runner::{AgentOutcome, AgentRunner};
pub use session::SessionMap;
pub use tools::{Tool, ToolContext, ToolRegistry};
pub use types::{AppError, Intent, ResearchReport, Result, TaskRequest};
pub use visuals::{ImageGenerator, VisualStage};
