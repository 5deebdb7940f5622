//! The `delphi` CLI: run one research task from the terminal.
//!
//! Uses clap for argument parsing and owo-colors for colored terminal
//! output. The pipeline itself lives in the library crate; this binary only
//! wires the OpenAI backend together, streams events, and renders them.

use clap::Parser;
use delphi::events::PipelineEvent;
use delphi::types::FileRef;
use delphi::{
    InMemoryKnowledgeStore, OpenAiBackend, OpenAiImageGenerator, Orchestrator, PipelineConfig,
    TaskRequest,
};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Delphi - Multi-Agent Deep Research Pipeline
#[derive(Parser, Debug)]
#[command(
    name = "delphi",
    version,
    about = "Delphi - Multi-Agent Deep Research Pipeline",
    long_about = "Routes a query through an analyzer, planner, researcher, visualizer, and\n\
                  evaluator to produce a structured research report. Simple questions are\n\
                  answered directly.",
    after_help = "EXAMPLES:\n    \
                  delphi \"Compare the last three Mars rover missions\"\n    \
                  delphi --attach report.pdf \"Summarize the attached document\"\n    \
                  delphi --session work \"What did we conclude earlier?\"\n    \
                  delphi --sse \"...\"              # Emit raw SSE frames"
)]
struct Cli {
    /// The query to run
    query: String,

    /// Session id; reuse one to keep conversation history across runs
    #[arg(short, long, default_value = "cli")]
    session: String,

    /// Upload a local file and attach it to the task
    #[arg(short, long)]
    attach: Option<PathBuf>,

    /// Print raw SSE frames instead of human-readable output
    #[arg(long)]
    sse: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> delphi::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delphi=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env()?;

    let backend = Arc::new(OpenAiBackend::new(
        config.api_key.clone(),
        config.api_base.clone(),
    ));
    let knowledge = Arc::new(InMemoryKnowledgeStore::new(backend.clone()));
    let images = Arc::new(OpenAiImageGenerator::new(
        config.api_key.clone(),
        config.api_base.clone(),
    ));

    let attachment = match &cli.attach {
        Some(path) => Some(upload(&backend, path).await?),
        None => None,
    };

    let orchestrator = Arc::new(Orchestrator::new(backend, knowledge, images, config));
    let mut events = orchestrator.spawn_task(TaskRequest {
        query: cli.query.clone(),
        session_id: cli.session.clone(),
        attachment,
    });

    let colored = !cli.no_color;
    while let Some(event) = events.recv().await {
        if cli.sse {
            print!("{}", event.sse_frame());
        } else {
            render(&event, colored);
        }
    }
    Ok(())
}

async fn upload(backend: &OpenAiBackend, path: &PathBuf) -> delphi::Result<FileRef> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    backend.upload_file(&name, bytes).await
}

fn render(event: &PipelineEvent, colored: bool) {
    match event {
        PipelineEvent::Thinking(text) => {
            if colored {
                println!("{} {}", "...".dimmed(), text.dimmed());
            } else {
                println!("... {}", text);
            }
        }
        PipelineEvent::AgentResponse { agent, response } => {
            if colored {
                println!("{} {}", format!("[{}]", agent).cyan().bold(), response);
            } else {
                println!("[{}] {}", agent, response);
            }
        }
        PipelineEvent::Report(report) => {
            let pretty =
                serde_json::to_string_pretty(report).unwrap_or_else(|_| report.to_string());
            if colored {
                println!("\n{}\n{}", "Report".green().bold(), pretty);
            } else {
                println!("\nReport\n{}", pretty);
            }
        }
        PipelineEvent::Error(message) => {
            if colored {
                eprintln!("{} {}", "error:".red().bold(), message);
            } else {
                eprintln!("error: {}", message);
            }
        }
        PipelineEvent::End(message) => {
            if colored {
                println!("{}", message.dimmed());
            } else {
                println!("{}", message);
            }
        }
    }
}
