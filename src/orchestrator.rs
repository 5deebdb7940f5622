//! The pipeline state machine.
//!
//! One task flows `AnalyzingIntent -> {ChatBranch, ResearchBranch} ->
//! Reporting -> Done`. The orchestrator resolves the session thread, runs
//! the analyzer, picks a branch, sequences the research roles, and emits
//! progress events throughout. Its guiding policy is degrade-not-abort: a
//! malformed decision falls open to research, a malformed evaluator output
//! becomes a deterministic fallback report, and (by default) a failed
//! research stage feeds its failure text forward instead of killing the
//! task. The consumer always receives exactly one `end` event, and a
//! `report` if and only if a branch reached reporting.

use crate::completion::CompletionBackend;
use crate::config::PipelineConfig;
use crate::events::{EventEmitter, PipelineEvent};
use crate::knowledge::KnowledgeStore;
use crate::roles;
use crate::runner::{AgentOutcome, AgentRunner};
use crate::session::SessionMap;
use crate::tools::knowledge::{
    AddTextTool, AnalyzeImageTool, KnowledgeQueryTool, ProcessDocumentTool,
};
use crate::tools::search::WebSearchTool;
use crate::tools::ToolRegistry;
use crate::types::{
    extract_json_object, AppError, Intent, IntentDecision, ResearchReport, Result, TaskRequest,
};
use crate::visuals::{ArtifactStore, ImageGenerator, VisualStage, VisualsOutcome};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;

pub struct Orchestrator {
    runner: AgentRunner,
    sessions: SessionMap,
    knowledge: Arc<dyn KnowledgeStore>,
    tools: Arc<ToolRegistry>,
    visuals: VisualStage,
    config: PipelineConfig,
    // Research branches share one knowledge store and clear it on entry, so
    // they must not interleave. Chat branches never touch the store and are
    // not serialized.
    research_guard: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        knowledge: Arc<dyn KnowledgeStore>,
        image_generator: Arc<dyn ImageGenerator>,
        config: PipelineConfig,
    ) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(WebSearchTool::new()));
        tools.register(Arc::new(AddTextTool::new(knowledge.clone())));
        tools.register(Arc::new(KnowledgeQueryTool::new(
            knowledge.clone(),
            config.knowledge_top_k,
        )));
        tools.register(Arc::new(ProcessDocumentTool::new(
            backend.clone(),
            knowledge.clone(),
            config.chunk_size,
            config.chunk_overlap,
        )));
        tools.register(Arc::new(AnalyzeImageTool::new(
            backend.clone(),
            knowledge.clone(),
        )));
        let tools = Arc::new(tools);

        let runner = AgentRunner::new(
            backend.clone(),
            tools.clone(),
            config.poll_interval,
            config.stage_timeout,
        );
        let sessions = SessionMap::new(backend);
        let visuals = VisualStage::new(
            image_generator,
            ArtifactStore::new(config.artifact_dir.clone(), config.artifact_base_path.clone()),
        );

        Self {
            runner,
            sessions,
            knowledge,
            tools,
            visuals,
            config,
            research_guard: Mutex::new(()),
        }
    }

    /// The knowledge store this pipeline reads and writes.
    pub fn knowledge(&self) -> &Arc<dyn KnowledgeStore> {
        &self.knowledge
    }

    /// The tools exposed to the research roles.
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run one task, emitting progress into `emitter`. Always terminates the
    /// stream with exactly one `end` event.
    pub async fn run_task(&self, request: TaskRequest, emitter: EventEmitter) {
        tracing::info!(session_id = %request.session_id, "starting task");
        if let Err(e) = self.execute(&request, &emitter).await {
            tracing::error!(error = %e, "task failed");
            emitter.error(e.to_string());
        }
        emitter.end("Task complete.");
    }

    /// Run one task detached on its own tokio task, handing back the event
    /// stream. Dropping the receiver does not cancel the pipeline; it runs
    /// to natural completion without emitting anywhere.
    pub fn spawn_task(self: &Arc<Self>, request: TaskRequest) -> UnboundedReceiver<PipelineEvent> {
        let (emitter, rx) = EventEmitter::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_task(request, emitter).await;
        });
        rx
    }

    async fn execute(&self, request: &TaskRequest, emitter: &EventEmitter) -> Result<()> {
        let thread = self.sessions.thread_for(&request.session_id).await?;

        emitter.thinking("Analyzing query...");
        let analyzer = roles::analyzer(&self.config.model);
        let outcome = self
            .runner
            .invoke(&analyzer, &thread, &request.query, request.attachment.as_ref())
            .await?;
        let decision = parse_intent_decision(&outcome, &request.query);
        emitter.agent_response(
            roles::ANALYZER,
            json!({
                "intent": decision.intent,
                "analyzed_query": decision.analyzed_query,
            }),
        );

        // An attachment always forces research: processing it needs planning
        // and tool use, whatever the classifier said.
        if decision.intent == Intent::Chat && request.attachment.is_none() {
            self.chat_branch(&thread, &decision.analyzed_query, emitter)
                .await
        } else {
            self.research_branch(request, &thread, &decision.analyzed_query, emitter)
                .await
        }
    }

    async fn chat_branch(
        &self,
        thread: &crate::completion::ThreadHandle,
        query: &str,
        emitter: &EventEmitter,
    ) -> Result<()> {
        emitter.thinking("Answering directly...");
        let chat = roles::chat(&self.config.model);
        let outcome = self.runner.invoke(&chat, thread, query, None).await?;
        if !outcome.completed {
            // A failed chat run leaves nothing worth reporting.
            return Err(AppError::Completion(outcome.text));
        }
        emitter.report(json!({"response": outcome.text}));
        Ok(())
    }

    async fn research_branch(
        &self,
        request: &TaskRequest,
        thread: &crate::completion::ThreadHandle,
        analyzed_query: &str,
        emitter: &EventEmitter,
    ) -> Result<()> {
        let _guard = self.research_guard.lock().await;

        // Per-task isolation: a research task never sees context left over
        // from a previous run, even on a long-lived session thread.
        self.knowledge.clear();

        emitter.thinking("Planning tasks...");
        let planner = roles::planner(&self.config.model, &self.tools);
        let mut planner_input = format!("Original user query: {}", analyzed_query);
        if let Some(file) = &request.attachment {
            planner_input.push_str(&format!("\nAttached file id: {}", file));
        }
        let plan = self
            .stage(&planner, thread, &planner_input, request.attachment.as_ref())
            .await?;
        emitter.agent_response(roles::PLANNER, stage_payload(&plan));

        emitter.thinking("Researching based on the plan...");
        let researcher = roles::researcher(&self.config.model, &self.tools);
        let research_input = format!("Research tasks: {}", plan.text);
        let report = self.stage(&researcher, thread, &research_input, None).await?;
        emitter.agent_response(roles::RESEARCHER, stage_payload(&report));

        emitter.thinking("Considering visuals...");
        let decider = roles::visual_decider(&self.config.model);
        let decision = self.stage(&decider, thread, &report.text, None).await?;
        let visuals = self.visuals.materialize(&decision.text).await;
        emitter.agent_response(
            roles::VISUAL_DECIDER,
            json!({"summary": visuals.summary, "files": visuals.files}),
        );

        emitter.thinking("Evaluating the final report...");
        let evaluator = roles::evaluator(&self.config.model);
        let evaluator_input = format!(
            "Original query: {}\n\nPlan: {}\n\nResearch report: {}\n\nVisuals summary: {}",
            analyzed_query, plan.text, report.text, visuals.summary
        );
        let evaluation = self.stage(&evaluator, thread, &evaluator_input, None).await?;

        emitter.report(assemble_report(&evaluation.text, &visuals));
        Ok(())
    }

    /// Run one research stage, applying the configured failure policy:
    /// degraded continuation (the failure text feeds the next stage) or
    /// hard failure. Transport errors always propagate.
    async fn stage(
        &self,
        role: &crate::completion::RoleSpec,
        thread: &crate::completion::ThreadHandle,
        input: &str,
        attachment: Option<&crate::types::FileRef>,
    ) -> Result<AgentOutcome> {
        let outcome = self.runner.invoke(role, thread, input, attachment).await?;
        if !outcome.completed {
            if self.config.continue_on_stage_failure {
                tracing::warn!(role = %role.name, "stage failed; continuing with degraded input");
                return Ok(outcome);
            }
            return Err(AppError::Completion(format!(
                "{} stage failed: {}",
                role.name, outcome.text
            )));
        }
        Ok(outcome)
    }
}

/// Parse the analyzer's decision, falling open to research with the original
/// query when the payload is malformed or the run failed.
fn parse_intent_decision(outcome: &AgentOutcome, original_query: &str) -> IntentDecision {
    if outcome.completed {
        if let Some(decision) = extract_json_object(&outcome.text)
            .and_then(|v| serde_json::from_value::<IntentDecision>(v).ok())
        {
            if !decision.analyzed_query.trim().is_empty() {
                return decision;
            }
        }
    }
    tracing::warn!("intent decision unusable; falling open to research");
    IntentDecision {
        intent: Intent::Research,
        analyzed_query: original_query.to_string(),
    }
}

/// A stage's event payload: parsed JSON when the role produced some, raw
/// text otherwise.
fn stage_payload(outcome: &AgentOutcome) -> Value {
    extract_json_object(&outcome.text).unwrap_or_else(|| Value::String(outcome.text.clone()))
}

/// Build the final report payload. A malformed evaluator output becomes the
/// deterministic fallback shape; either way the visuals list comes from the
/// visual stage alone.
fn assemble_report(evaluator_text: &str, visuals: &VisualsOutcome) -> Value {
    match extract_json_object(evaluator_text)
        .and_then(|v| serde_json::from_value::<ResearchReport>(v).ok())
    {
        Some(mut report) => {
            report.visuals = visuals.files.clone();
            serde_json::to_value(report).unwrap_or_else(|_| fallback_report(evaluator_text, visuals))
        }
        None => fallback_report(evaluator_text, visuals),
    }
}

fn fallback_report(raw: &str, visuals: &VisualsOutcome) -> Value {
    json!({
        "executive_summary": "The evaluator did not return a structured report; its raw output is preserved below.",
        "key_findings": [],
        "visuals": visuals.files,
        "conclusion": "Automatic fallback: the evaluator output could not be parsed as a structured report.",
        "references": [],
        "raw_evaluator_output": raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(text: &str) -> AgentOutcome {
        AgentOutcome {
            text: text.to_string(),
            artifact_refs: Vec::new(),
            completed: true,
        }
    }

    #[test]
    fn test_intent_parse_happy_path() {
        let outcome = completed(r#"{"intent": "chat", "analyzed_query": "what is 2+2"}"#);
        let decision = parse_intent_decision(&outcome, "orig");
        assert_eq!(decision.intent, Intent::Chat);
        assert_eq!(decision.analyzed_query, "what is 2+2");
    }

    #[test]
    fn test_intent_parse_falls_open_to_research() {
        let outcome = completed("I think this is a chat question");
        let decision = parse_intent_decision(&outcome, "original question");
        assert_eq!(decision.intent, Intent::Research);
        assert_eq!(decision.analyzed_query, "original question");
    }

    #[test]
    fn test_intent_parse_rejects_blank_query() {
        let outcome = completed(r#"{"intent": "chat", "analyzed_query": "  "}"#);
        let decision = parse_intent_decision(&outcome, "fallback");
        assert_eq!(decision.intent, Intent::Research);
        assert_eq!(decision.analyzed_query, "fallback");
    }

    #[test]
    fn test_intent_parse_ignores_failed_run() {
        let outcome = AgentOutcome {
            text: r#"{"intent": "chat", "analyzed_query": "q"}"#.to_string(),
            artifact_refs: Vec::new(),
            completed: false,
        };
        let decision = parse_intent_decision(&outcome, "orig");
        assert_eq!(decision.intent, Intent::Research);
    }

    #[test]
    fn test_assemble_report_injects_stage_visuals() {
        let visuals = VisualsOutcome {
            files: vec!["/files/abc.png".to_string()],
            summary: "one chart".to_string(),
        };
        let text = r#"{"executive_summary": "s", "key_findings": ["f"], "visuals": ["hallucinated.png"], "conclusion": "c", "references": []}"#;
        let report = assemble_report(text, &visuals);
        // The stage's real artifacts replace whatever the evaluator claimed.
        assert_eq!(report["visuals"], json!(["/files/abc.png"]));
        assert_eq!(report["executive_summary"], "s");
    }

    #[test]
    fn test_assemble_report_fallback_shape() {
        let visuals = VisualsOutcome {
            files: Vec::new(),
            summary: "none".to_string(),
        };
        let report = assemble_report("totally not json", &visuals);
        assert_eq!(report["raw_evaluator_output"], "totally not json");
        assert!(report["conclusion"].as_str().unwrap().contains("fallback"));
        assert_eq!(report["key_findings"], json!([]));
        assert_eq!(report["visuals"], json!([]));
        assert_eq!(report["references"], json!([]));
        assert!(report["executive_summary"].is_string());
    }
}
