//! crates/lesson_planner_core/src/chat.rs
//!
//! Per-lesson chat transcripts and the latest intent analysis.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

use crate::api::ChatApi;
use crate::domain::{AnalyzeResponse, ChatMessage, ChatResponse, ChatRole};
use crate::ports::PortResult;

#[derive(Default)]
struct ChatState {
    transcripts: HashMap<String, Vec<ChatMessage>>,
    analysis: Option<AnalyzeResponse>,
    /// Number of chat requests currently awaiting a response.
    in_flight: usize,
    error: Option<String>,
}

pub struct ChatStore {
    api: ChatApi,
    state: Mutex<ChatState>,
}

impl ChatStore {
    pub fn new(api: ChatApi) -> Self {
        Self {
            api,
            state: Mutex::new(ChatState::default()),
        }
    }

    fn begin(&self) {
        self.state.lock().in_flight += 1;
    }

    /// Closes one request and records its outcome.
    fn finish<T>(&self, context: &str, result: &PortResult<T>) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        match result {
            Ok(_) => state.error = None,
            Err(e) => {
                warn!(error = %e, "{context}");
                state.error = Some(e.to_string());
            }
        }
    }

    /// Sends a chat turn. Both the user turn and the assistant reply are
    /// appended only once the server has answered.
    pub async fn send_message(
        &self,
        lesson_id: &str,
        message: &str,
        existing_plan: Option<&str>,
        analysis: Option<&AnalyzeResponse>,
    ) -> PortResult<ChatResponse> {
        self.begin();
        let result = self
            .api
            .send_message(lesson_id, message, existing_plan, analysis)
            .await;
        if let Ok(response) = &result {
            let mut state = self.state.lock();
            let transcript = state.transcripts.entry(lesson_id.to_string()).or_default();
            transcript.push(ChatMessage::now(ChatRole::User, message));
            transcript.push(ChatMessage::now(ChatRole::Assistant, response.chat_response.clone()));
        }
        self.finish("Failed to send chat message", &result);
        result
    }

    /// Replaces the lesson's transcript with the server's copy.
    pub async fn fetch_history(&self, lesson_id: &str) -> PortResult<()> {
        self.begin();
        let result = self.api.history(lesson_id).await;
        let outcome = result.map(|history| {
            self.state
                .lock()
                .transcripts
                .insert(lesson_id.to_string(), history);
        });
        self.finish("Failed to fetch chat history", &outcome);
        outcome
    }

    pub async fn analyze(&self, message: &str, existing_plan: &str) -> PortResult<AnalyzeResponse> {
        self.begin();
        let result = self.api.analyze(message, existing_plan).await;
        if let Ok(analysis) = &result {
            self.state.lock().analysis = Some(analysis.clone());
        }
        self.finish("Failed to analyze chat message", &result);
        result
    }

    /// Asks for an edit scoped to one lesson component. The transcript is
    /// left as is.
    pub async fn send_component_message(
        &self,
        lesson_id: &str,
        message: &str,
        existing_plan: &str,
        component: &str,
        analysis: Option<&AnalyzeResponse>,
    ) -> PortResult<ChatResponse> {
        self.begin();
        let result = self
            .api
            .send_component_message(lesson_id, message, existing_plan, component, analysis)
            .await;
        self.finish("Failed to send component message", &result);
        result
    }

    /// The transcript for a lesson; empty when none has been loaded.
    pub fn history(&self, lesson_id: &str) -> Vec<ChatMessage> {
        self.state
            .lock()
            .transcripts
            .get(lesson_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn analysis(&self) -> Option<AnalyzeResponse> {
        self.state.lock().analysis.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight > 0
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    /// Forgets every transcript and the last analysis.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.transcripts.clear();
        state.analysis = None;
        state.error = None;
    }
}
