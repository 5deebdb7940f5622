//! The protocol engine that drives one role invocation to completion.
//!
//! A run moves through `Submitted -> Polling -> {Completed,
//! RequiresToolResolution, Failed}`; resolving tool calls re-enters polling,
//! which is the only cycle. Polling sleeps cooperatively between checks so
//! concurrent pipelines interleave freely, and the whole loop is bounded by
//! the configured stage timeout.

use crate::completion::{CompletionBackend, RoleSpec, RunState, ThreadHandle};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{FileRef, Result, ToolCallRequest, ToolCallResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one role invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The role's final text, or a failure description when `completed` is
    /// false.
    pub text: String,
    /// References to files the role generated alongside its message.
    pub artifact_refs: Vec<String>,
    /// False when the run ended in a terminal failure or timed out. The
    /// caller decides whether that is fatal for its stage.
    pub completed: bool,
}

impl AgentOutcome {
    fn failed(text: String) -> Self {
        Self {
            text,
            artifact_refs: Vec::new(),
            completed: false,
        }
    }
}

pub struct AgentRunner {
    backend: Arc<dyn CompletionBackend>,
    tools: Arc<ToolRegistry>,
    poll_interval: Duration,
    stage_timeout: Duration,
}

impl AgentRunner {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        tools: Arc<ToolRegistry>,
        poll_interval: Duration,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            tools,
            poll_interval,
            stage_timeout,
        }
    }

    /// Drive one invocation of `role` on `thread` to a terminal outcome.
    ///
    /// Transport errors propagate as `Err`; terminal run statuses and
    /// timeouts come back as a non-`completed` outcome whose text encodes
    /// the failure.
    pub async fn invoke(
        &self,
        role: &RoleSpec,
        thread: &ThreadHandle,
        input: &str,
        attachment: Option<&FileRef>,
    ) -> Result<AgentOutcome> {
        self.backend
            .add_user_message(thread, input, attachment)
            .await?;
        let run = self.backend.start_run(thread, role).await?;
        tracing::info!(role = %role.name, run = %run.0, "run submitted");

        let ctx = ToolContext {
            attachment: attachment.cloned(),
        };
        let deadline = Instant::now() + self.stage_timeout;

        loop {
            if Instant::now() >= deadline {
                tracing::warn!(role = %role.name, "stage timed out while polling");
                return Ok(AgentOutcome::failed(format!(
                    "Run timed out after {}s",
                    self.stage_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;

            match self.backend.run_state(thread, &run).await? {
                RunState::InFlight => continue,
                RunState::RequiresToolResolution(calls) => {
                    let outputs = self.resolve_tool_calls(calls, &ctx).await;
                    self.backend
                        .submit_tool_outputs(thread, &run, outputs)
                        .await?;
                }
                RunState::Completed => {
                    let message = self.backend.latest_assistant_message(thread).await?;
                    tracing::info!(role = %role.name, "run completed");
                    return Ok(AgentOutcome {
                        text: message.text,
                        artifact_refs: message.file_refs,
                        completed: true,
                    });
                }
                RunState::Terminal(status) => {
                    tracing::warn!(role = %role.name, status = %status, "run ended without a message");
                    return Ok(AgentOutcome::failed(format!(
                        "Run failed with status: {}",
                        status
                    )));
                }
            }
        }
    }

    /// Resolve every pending call concurrently and collect one result per
    /// call before returning. Failures become error-string outputs; no call
    /// is ever dropped, so the run cannot stall on a missing result.
    async fn resolve_tool_calls(
        &self,
        calls: Vec<ToolCallRequest>,
        ctx: &ToolContext,
    ) -> Vec<ToolCallResult> {
        let futures = calls.into_iter().map(|call| {
            let tools = Arc::clone(&self.tools);
            async move {
                let output = tools.dispatch(&call.name, call.arguments, ctx).await;
                ToolCallResult {
                    call_id: call.call_id,
                    output,
                }
            }
        });
        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{AssistantMessage, RunHandle};
    use crate::types::AppError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;

    /// Backend that replays a scripted sequence of run states and records
    /// every tool-output submission.
    struct ScriptedBackend {
        states: Mutex<VecDeque<RunState>>,
        message: AssistantMessage,
        submitted: Mutex<Vec<Vec<ToolCallResult>>>,
    }

    impl ScriptedBackend {
        fn new(states: Vec<RunState>, message: AssistantMessage) -> Self {
            Self {
                states: Mutex::new(states.into()),
                message,
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn create_thread(&self) -> Result<ThreadHandle> {
            Ok(ThreadHandle("thread-1".to_string()))
        }
        async fn add_user_message(
            &self,
            _thread: &ThreadHandle,
            _text: &str,
            _attachment: Option<&FileRef>,
        ) -> Result<()> {
            Ok(())
        }
        async fn start_run(&self, _thread: &ThreadHandle, _role: &RoleSpec) -> Result<RunHandle> {
            Ok(RunHandle("run-1".to_string()))
        }
        async fn run_state(&self, _thread: &ThreadHandle, _run: &RunHandle) -> Result<RunState> {
            Ok(self
                .states
                .lock()
                .pop_front()
                .unwrap_or(RunState::InFlight))
        }
        async fn submit_tool_outputs(
            &self,
            _thread: &ThreadHandle,
            _run: &RunHandle,
            outputs: Vec<ToolCallResult>,
        ) -> Result<()> {
            self.submitted.lock().push(outputs);
            Ok(())
        }
        async fn latest_assistant_message(
            &self,
            _thread: &ThreadHandle,
        ) -> Result<AssistantMessage> {
            Ok(self.message.clone())
        }
        async fn fetch_file(&self, _file_id: &str) -> Result<Vec<u8>> {
            Err(AppError::Completion("no files in this test".to_string()))
        }
        async fn describe_image(&self, _file_id: &str, _prompt: &str) -> Result<String> {
            Err(AppError::Completion("no vision in this test".to_string()))
        }
    }

    struct UpperTool;

    #[async_trait]
    impl crate::tools::Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: Value) -> Result<Value> {
            Ok(Value::String(
                args["text"].as_str().unwrap_or_default().to_uppercase(),
            ))
        }
    }

    fn runner(backend: Arc<ScriptedBackend>) -> AgentRunner {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(UpperTool));
        AgentRunner::new(
            backend,
            Arc::new(tools),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
    }

    fn role() -> RoleSpec {
        RoleSpec {
            name: "test-role".to_string(),
            instructions: "do the thing".to_string(),
            model: "test-model".to_string(),
            tools: Vec::new(),
            code_interpreter: false,
            file_search: false,
            json_response: false,
        }
    }

    #[tokio::test]
    async fn test_invoke_completes_with_message() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![RunState::InFlight, RunState::Completed],
            AssistantMessage {
                text: "final answer".to_string(),
                file_refs: vec!["file-gen".to_string()],
            },
        ));
        let outcome = runner(backend)
            .invoke(&role(), &ThreadHandle("t".to_string()), "input", None)
            .await
            .unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.text, "final answer");
        assert_eq!(outcome.artifact_refs, vec!["file-gen".to_string()]);
    }

    #[tokio::test]
    async fn test_tool_batch_gets_one_result_per_call() {
        let calls = vec![
            ToolCallRequest {
                call_id: "c1".to_string(),
                name: "upper".to_string(),
                arguments: json!({"text": "abc"}),
            },
            ToolCallRequest {
                call_id: "c2".to_string(),
                name: "missing_tool".to_string(),
                arguments: json!({}),
            },
            ToolCallRequest {
                call_id: "c3".to_string(),
                name: "upper".to_string(),
                arguments: json!({"text": "xyz"}),
            },
        ];
        let backend = Arc::new(ScriptedBackend::new(
            vec![
                RunState::RequiresToolResolution(calls),
                RunState::InFlight,
                RunState::Completed,
            ],
            AssistantMessage {
                text: "done".to_string(),
                file_refs: Vec::new(),
            },
        ));
        let outcome = runner(backend.clone())
            .invoke(&role(), &ThreadHandle("t".to_string()), "input", None)
            .await
            .unwrap();
        assert!(outcome.completed);

        let submissions = backend.submitted.lock();
        assert_eq!(submissions.len(), 1, "batch must be submitted atomically");
        let batch = &submissions[0];
        assert_eq!(batch.len(), 3, "every call gets exactly one result");

        let by_id = |id: &str| batch.iter().find(|r| r.call_id == id).unwrap();
        assert_eq!(by_id("c1").output, "ABC");
        assert!(by_id("c2").output.starts_with("Error:"));
        assert_eq!(by_id("c3").output, "XYZ");
    }

    #[tokio::test]
    async fn test_terminal_status_yields_failure_outcome() {
        let backend = Arc::new(ScriptedBackend::new(
            vec![RunState::Terminal("expired".to_string())],
            AssistantMessage::default(),
        ));
        let outcome = runner(backend)
            .invoke(&role(), &ThreadHandle("t".to_string()), "input", None)
            .await
            .unwrap();
        assert!(!outcome.completed);
        assert!(outcome.text.contains("expired"));
        assert!(outcome.artifact_refs.is_empty());
    }

    #[tokio::test]
    async fn test_polling_is_bounded_by_stage_timeout() {
        // Backend never leaves InFlight; the runner must give up.
        let backend = Arc::new(ScriptedBackend::new(vec![], AssistantMessage::default()));
        let runner = AgentRunner::new(
            backend,
            Arc::new(ToolRegistry::new()),
            Duration::from_millis(1),
            Duration::from_millis(20),
        );
        let outcome = runner
            .invoke(&role(), &ThreadHandle("t".to_string()), "input", None)
            .await
            .unwrap();
        assert!(!outcome.completed);
        assert!(outcome.text.contains("timed out"));
    }
}
