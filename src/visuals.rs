//! Visual generation stage: decide, synthesize, persist.
//!
//! The orchestrator runs the visual-decider role and hands its raw output
//! to this stage. The stage parses the decision, optionally synthesizes one
//! image, persists it under a fresh unique name, and degrades to an empty
//! result on any failure. Nothing raises past it.

use crate::types::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// External image-synthesis service.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Produce one image (PNG bytes) from a text prompt.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}

/// Persists generated visuals under a public static directory and hands out
/// stable relative reference paths.
pub struct ArtifactStore {
    dir: PathBuf,
    base_path: String,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf, base_path: String) -> Self {
        Self { dir, base_path }
    }

    /// Write PNG bytes under a fresh uuid name and return the public path,
    /// e.g. `/files/5f3a....png`.
    pub async fn save_png(&self, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{}.png", Uuid::new_v4());
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        Ok(format!("{}/{}", self.base_path.trim_end_matches('/'), name))
    }
}

/// The decider role's structured verdict.
#[derive(Debug, Deserialize)]
struct VisualDecision {
    generate: bool,
    prompt: Option<String>,
    #[serde(default)]
    summary: String,
}

/// What the stage hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct VisualsOutcome {
    /// Public reference paths of persisted images; empty when nothing was
    /// generated.
    pub files: Vec<String>,
    /// The decider's explanation, or the error text when generation was
    /// attempted and failed.
    pub summary: String,
}

impl VisualsOutcome {
    fn empty(summary: String) -> Self {
        Self {
            files: Vec::new(),
            summary,
        }
    }
}

pub struct VisualStage {
    generator: Arc<dyn ImageGenerator>,
    artifacts: ArtifactStore,
}

impl VisualStage {
    pub fn new(generator: Arc<dyn ImageGenerator>, artifacts: ArtifactStore) -> Self {
        Self {
            generator,
            artifacts,
        }
    }

    /// Turn the decider's raw output into persisted visuals.
    pub async fn materialize(&self, decision_text: &str) -> VisualsOutcome {
        let decision = match crate::types::extract_json_object(decision_text)
            .and_then(|v| serde_json::from_value::<VisualDecision>(v).ok())
        {
            Some(decision) => decision,
            None => {
                tracing::warn!("visual decision was unparsable; skipping generation");
                return VisualsOutcome::empty(format!(
                    "No visual generated; the decision could not be parsed: {}",
                    decision_text
                ));
            }
        };

        if !decision.generate {
            return VisualsOutcome::empty(decision.summary);
        }
        let Some(prompt) = decision.prompt.filter(|p| !p.trim().is_empty()) else {
            return VisualsOutcome::empty(
                "No visual generated; the decider requested one without a prompt.".to_string(),
            );
        };

        match self.synthesize(&prompt).await {
            Ok(path) => {
                tracing::info!(path = %path, "visual persisted");
                VisualsOutcome {
                    files: vec![path],
                    summary: decision.summary,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "visual generation failed; degrading to empty result");
                VisualsOutcome::empty(format!("Visual generation failed: {}", e))
            }
        }
    }

    async fn synthesize(&self, prompt: &str) -> Result<String> {
        let bytes = self.generator.generate(prompt).await?;
        self.artifacts.save_png(&bytes).await
    }
}
