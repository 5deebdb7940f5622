//! Pipeline progress events and the emitter that streams them.
//!
//! The emitter is transport-agnostic: it pushes typed events into an
//! unbounded channel whose receiving half can feed an SSE response, a
//! WebSocket, or an in-process consumer. `sse_frame` renders the
//! `event:`/`data:` framing for callers that speak server-sent events.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A typed progress event produced by one pipeline task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Free-text progress narration.
    Thinking(String),
    /// A stage's structured payload.
    AgentResponse {
        agent: String,
        response: serde_json::Value,
    },
    /// The final report payload. Emitted at most once per task.
    Report(serde_json::Value),
    /// Terminal failure payload.
    Error(String),
    /// Stream terminator. Emitted exactly once per task.
    End(String),
}

impl PipelineEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Thinking(_) => "thinking",
            PipelineEvent::AgentResponse { .. } => "agent_response",
            PipelineEvent::Report(_) => "report",
            PipelineEvent::Error(_) => "error",
            PipelineEvent::End(_) => "end",
        }
    }

    /// Render this event as a server-sent-events frame.
    pub fn sse_frame(&self) -> String {
        let data = match self {
            PipelineEvent::Thinking(text) | PipelineEvent::Error(text) | PipelineEvent::End(text) => {
                text.clone()
            }
            PipelineEvent::AgentResponse { agent, response } => {
                serde_json::json!({"agent": agent, "response": response}).to_string()
            }
            PipelineEvent::Report(payload) => payload.to_string(),
        };
        format!("event: {}\ndata: {}\n\n", self.name(), data)
    }
}

/// Sender half of a pipeline's event stream.
///
/// Sends never fail: a consumer that disconnected mid-task simply stops
/// receiving, and the pipeline runs to its natural completion detached.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventEmitter {
    /// Create an emitter together with the receiving half of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event consumer disconnected; continuing detached");
        }
    }

    pub fn thinking(&self, text: impl Into<String>) {
        self.emit(PipelineEvent::Thinking(text.into()));
    }

    pub fn agent_response(&self, agent: &str, response: serde_json::Value) {
        self.emit(PipelineEvent::AgentResponse {
            agent: agent.to_string(),
            response,
        });
    }

    pub fn report(&self, payload: serde_json::Value) {
        self.emit(PipelineEvent::Report(payload));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(PipelineEvent::Error(text.into()));
    }

    pub fn end(&self, text: impl Into<String>) {
        self.emit(PipelineEvent::End(text.into()));
    }
}
