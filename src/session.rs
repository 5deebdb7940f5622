//! Session-to-thread continuity.
//!
//! A session id maps to one persistent dialogue thread on the completion
//! service, so multi-turn conversations keep their history across tasks.
//! Sessions are created lazily and live for the process lifetime.

use crate::completion::{CompletionBackend, ThreadHandle};
use crate::types::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SessionMap {
    backend: Arc<dyn CompletionBackend>,
    // The lock is held across thread creation so check-then-create is one
    // atomic step: two concurrent requests for the same session id cannot
    // race into two separate threads.
    threads: Mutex<HashMap<String, ThreadHandle>>,
}

impl SessionMap {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a session id to its thread, creating the thread on first use.
    pub async fn thread_for(&self, session_id: &str) -> Result<ThreadHandle> {
        let mut threads = self.threads.lock().await;
        if let Some(thread) = threads.get(session_id) {
            return Ok(thread.clone());
        }
        let thread = self.backend.create_thread().await?;
        tracing::info!(session_id, thread = %thread.0, "created thread for session");
        threads.insert(session_id.to_string(), thread.clone());
        Ok(thread)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.threads.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
