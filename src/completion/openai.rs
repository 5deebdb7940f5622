//! Assistants-API backend for the completion contract.
//!
//! Talks to the OpenAI assistants v2 surface over plain reqwest: assistants
//! are created lazily per role and cached, threads and runs follow the
//! create/poll/submit lifecycle, and generated files are downloaded through
//! the files endpoint. The same client also serves embeddings (for the
//! knowledge store) and image generation (for the visual stage).

use crate::completion::{
    AssistantMessage, CompletionBackend, RoleSpec, RunHandle, RunState, ThreadHandle,
};
use crate::knowledge::EmbeddingProvider;
use crate::types::{AppError, FileRef, Result, ToolCallRequest, ToolCallResult};
use crate::visuals::ImageGenerator;
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// OpenAI assistants backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    /// role name -> assistant id, so each role's assistant is created once
    /// per process.
    assistants: Mutex<HashMap<String, String>>,
}

impl OpenAiBackend {
    pub fn new(api_key: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            assistants: Mutex::new(HashMap::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Completion(format!(
                "completion service returned {}: {}",
                status, body
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| AppError::Completion(format!("malformed service response: {}", e)))
    }

    /// Get the assistant id for a role, creating it on first use.
    async fn assistant_for(&self, role: &RoleSpec) -> Result<String> {
        let mut cache = self.assistants.lock().await;
        if let Some(id) = cache.get(&role.name) {
            return Ok(id.clone());
        }

        let mut tools: Vec<Value> = role
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        if role.code_interpreter {
            tools.push(json!({"type": "code_interpreter"}));
        }
        if role.file_search {
            tools.push(json!({"type": "file_search"}));
        }

        let mut body = json!({
            "name": role.name,
            "instructions": role.instructions,
            "model": role.model,
            "tools": tools,
        });
        if role.json_response {
            body["response_format"] = json!({"type": "json_object"});
        }

        let created = self.post_json("assistants", body).await?;
        let id = created["id"]
            .as_str()
            .ok_or_else(|| AppError::Completion("assistant response missing id".to_string()))?
            .to_string();
        tracing::info!(role = %role.name, assistant_id = %id, "created assistant");
        cache.insert(role.name.clone(), id.clone());
        Ok(id)
    }

    /// Upload a local file for use as an attachment. Used by callers that
    /// accept uploads (the CLI); the pipeline itself only consumes ids.
    pub async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<FileRef> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let value = Self::decode(response).await?;
        let id = value["id"]
            .as_str()
            .ok_or_else(|| AppError::Completion("file upload response missing id".to_string()))?;
        Ok(FileRef(id.to_string()))
    }

    fn parse_tool_calls(run: &Value) -> Vec<ToolCallRequest> {
        run["required_action"]["submit_tool_outputs"]["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| {
                        let arguments = call["function"]["arguments"]
                            .as_str()
                            .and_then(|raw| serde_json::from_str(raw).ok())
                            .unwrap_or_else(|| json!({}));
                        ToolCallRequest {
                            call_id: call["id"].as_str().unwrap_or_default().to_string(),
                            name: call["function"]["name"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                            arguments,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn create_thread(&self) -> Result<ThreadHandle> {
        let thread = self.post_json("threads", json!({})).await?;
        let id = thread["id"]
            .as_str()
            .ok_or_else(|| AppError::Completion("thread response missing id".to_string()))?;
        Ok(ThreadHandle(id.to_string()))
    }

    async fn add_user_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
        attachment: Option<&FileRef>,
    ) -> Result<()> {
        let mut body = json!({"role": "user", "content": text});
        if let Some(file) = attachment {
            body["attachments"] = json!([{
                "file_id": file.as_str(),
                "tools": [{"type": "file_search"}, {"type": "code_interpreter"}],
            }]);
        }
        self.post_json(&format!("threads/{}/messages", thread.0), body)
            .await?;
        Ok(())
    }

    async fn start_run(&self, thread: &ThreadHandle, role: &RoleSpec) -> Result<RunHandle> {
        let assistant_id = self.assistant_for(role).await?;
        let run = self
            .post_json(
                &format!("threads/{}/runs", thread.0),
                json!({"assistant_id": assistant_id}),
            )
            .await?;
        let id = run["id"]
            .as_str()
            .ok_or_else(|| AppError::Completion("run response missing id".to_string()))?;
        Ok(RunHandle(id.to_string()))
    }

    async fn run_state(&self, thread: &ThreadHandle, run: &RunHandle) -> Result<RunState> {
        let state = self
            .get_json(&format!("threads/{}/runs/{}", thread.0, run.0))
            .await?;
        let status = state["status"].as_str().unwrap_or("unknown");
        Ok(match status {
            "queued" | "in_progress" | "cancelling" => RunState::InFlight,
            "requires_action" => RunState::RequiresToolResolution(Self::parse_tool_calls(&state)),
            "completed" => RunState::Completed,
            other => RunState::Terminal(other.to_string()),
        })
    }

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadHandle,
        run: &RunHandle,
        outputs: Vec<ToolCallResult>,
    ) -> Result<()> {
        let tool_outputs: Vec<Value> = outputs
            .iter()
            .map(|o| json!({"tool_call_id": o.call_id, "output": o.output}))
            .collect();
        self.post_json(
            &format!("threads/{}/runs/{}/submit_tool_outputs", thread.0, run.0),
            json!({"tool_outputs": tool_outputs}),
        )
        .await?;
        Ok(())
    }

    async fn latest_assistant_message(&self, thread: &ThreadHandle) -> Result<AssistantMessage> {
        let listing = self
            .get_json(&format!("threads/{}/messages?limit=20", thread.0))
            .await?;
        let messages = listing["data"].as_array().cloned().unwrap_or_default();

        // Messages come back newest first; take the first assistant-authored one.
        for message in &messages {
            if message["role"].as_str() != Some("assistant") {
                continue;
            }
            let mut out = AssistantMessage::default();
            for part in message["content"].as_array().cloned().unwrap_or_default() {
                match part["type"].as_str() {
                    Some("text") => {
                        if let Some(value) = part["text"]["value"].as_str() {
                            if !out.text.is_empty() {
                                out.text.push('\n');
                            }
                            out.text.push_str(value);
                        }
                    }
                    Some("image_file") => {
                        if let Some(id) = part["image_file"]["file_id"].as_str() {
                            out.file_refs.push(id.to_string());
                        }
                    }
                    _ => {}
                }
            }
            return Ok(out);
        }

        Err(AppError::Completion(
            "no assistant message found on thread".to_string(),
        ))
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("files/{}/content", file_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Completion(format!(
                "file download returned {}",
                status
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn describe_image(&self, file_id: &str, prompt: &str) -> Result<String> {
        // The chat endpoint cannot reference service-side file ids, so the
        // image travels inline as a data URL.
        let bytes = self.fetch_file(file_id).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let body = json!({
            "model": "gpt-4o",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{}", encoded)}},
                ],
            }],
        });
        let response = self.post_json("chat/completions", body).await?;
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Completion("vision response had no content".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = text.replace('\n', " ");
        let response = self
            .post_json(
                "embeddings",
                json!({"model": "text-embedding-3-small", "input": [input]}),
            )
            .await?;
        let vector = response["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| AppError::Completion("embedding response missing vector".to_string()))?;
        Ok(vector
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect())
    }
}

/// Image synthesis via the images endpoint.
pub struct OpenAiImageGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiImageGenerator {
    pub fn new(api_key: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            model: "dall-e-3".to_string(),
        }
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!(
                "{}/images/generations",
                self.api_base.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "n": 1,
                "size": "1024x1024",
                "response_format": "b64_json",
            }))
            .send()
            .await?;
        let value = OpenAiBackend::decode(response).await?;
        let encoded = value["data"][0]["b64_json"]
            .as_str()
            .ok_or_else(|| AppError::Completion("image response missing payload".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AppError::Completion(format!("image payload decode failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_calls_from_required_action() {
        let run = json!({
            "required_action": {
                "submit_tool_outputs": {
                    "tool_calls": [
                        {"id": "call_1", "function": {"name": "web_search", "arguments": "{\"query\": \"rust\"}"}},
                        {"id": "call_2", "function": {"name": "knowledge_query", "arguments": "not json"}},
                    ]
                }
            }
        });
        let calls = OpenAiBackend::parse_tool_calls(&run);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "call_1");
        assert_eq!(calls[0].arguments["query"], "rust");
        // Unparsable arguments degrade to an empty object, not a dropped call.
        assert_eq!(calls[1].name, "knowledge_query");
        assert!(calls[1].arguments.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_parse_tool_calls_absent() {
        let calls = OpenAiBackend::parse_tool_calls(&json!({"status": "completed"}));
        assert!(calls.is_empty());
    }
}
