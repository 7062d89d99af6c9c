//! crates/lesson_planner_core/src/api/chat.rs
//!
//! Lesson chat endpoints: conversational revision, intent analysis, per-lesson
//! transcripts and component-scoped edits.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{decode_or_default, segment};
use crate::domain::{AnalyzeResponse, ChatMessage, ChatResponse};
use crate::ports::PortResult;
use crate::request::ApiClient;

const BASE: &str = "/lessons";

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_plan: Option<&'a str>,
    #[serde(rename = "lessonId")]
    lesson_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a AnalyzeResponse>,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    message: &'a str,
    existing_plan: &'a str,
}

#[derive(Serialize)]
struct ComponentRequest<'a> {
    #[serde(rename = "lessonId")]
    lesson_id: &'a str,
    message: &'a str,
    existing_plan: &'a str,
    component: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a AnalyzeResponse>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatHistory {
    #[serde(default)]
    chat_history: Vec<ChatMessage>,
}

pub struct ChatApi {
    client: Arc<ApiClient>,
}

impl ChatApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn send_message(
        &self,
        lesson_id: &str,
        message: &str,
        existing_plan: Option<&str>,
        analysis: Option<&AnalyzeResponse>,
    ) -> PortResult<ChatResponse> {
        let body = ChatRequest {
            message,
            existing_plan,
            lesson_id,
            analysis,
        };
        let value = self.client.post(&format!("{BASE}/chat"), &body).await?;
        decode_or_default(value)
    }

    pub async fn analyze(&self, message: &str, existing_plan: &str) -> PortResult<AnalyzeResponse> {
        let body = AnalyzeRequest {
            message,
            existing_plan,
        };
        let value = self.client.post(&format!("{BASE}/analyze"), &body).await?;
        decode_or_default(value)
    }

    pub async fn history(&self, lesson_id: &str) -> PortResult<Vec<ChatMessage>> {
        let value = self
            .client
            .get(&format!("{BASE}/{}/chat-history", segment(lesson_id)))
            .await?;
        decode_or_default::<ChatHistory>(value).map(|history| history.chat_history)
    }

    pub async fn send_component_message(
        &self,
        lesson_id: &str,
        message: &str,
        existing_plan: &str,
        component: &str,
        analysis: Option<&AnalyzeResponse>,
    ) -> PortResult<ChatResponse> {
        let body = ComponentRequest {
            lesson_id,
            message,
            existing_plan,
            component,
            analysis,
        };
        let value = self
            .client
            .post(&format!("{BASE}/chat/component"), &body)
            .await?;
        decode_or_default(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatRole;
    use crate::test_support::{api_client, signed_in_manager, ScriptedTransport};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn chat_body_mixes_snake_and_camel_case() {
        let transport = ScriptedTransport::new();
        transport.reply_json(200, json!({ "chatResponse": "Added a warm-up", "updatedComponents": ["warmup"] }));
        let (manager, _nav) = signed_in_manager();
        let api = ChatApi::new(api_client(&transport, &manager));

        let reply = api
            .send_message("lesson-1", "Add a warm-up", Some("{}"), None)
            .await
            .unwrap();

        assert_eq!(reply.chat_response, "Added a warm-up");
        assert_eq!(reply.updated_components, Some(vec!["warmup".to_string()]));
        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://api.test/lessons/chat");
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({ "message": "Add a warm-up", "existing_plan": "{}", "lessonId": "lesson-1" })
        );
    }

    #[tokio::test]
    async fn history_reads_the_transcript_envelope() {
        let transport = ScriptedTransport::new();
        transport.reply_json(
            200,
            json!({ "chatHistory": [
                { "role": "user", "content": "hi", "timestamp": "2024-05-01T10:00:00Z" },
                { "role": "assistant", "content": "hello", "timestamp": "2024-05-01T10:00:01Z" }
            ]}),
        );
        let (manager, _nav) = signed_in_manager();
        let api = ChatApi::new(api_client(&transport, &manager));

        let history = api.history("lesson-1").await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert_eq!(transport.requests()[0].url, "https://api.test/lessons/lesson-1/chat-history");
    }
}
