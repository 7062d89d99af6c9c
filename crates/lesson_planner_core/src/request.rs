//! crates/lesson_planner_core/src/request.rs
//!
//! The authenticated request client. Every outbound API call goes through
//! here: it attaches the bearer token from the session manager, serializes
//! JSON bodies, and normalizes responses and failures for all resource types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::Session;
use crate::ports::{HttpRequest, HttpResponse, HttpTransport, Method, PortError, PortResult};
use crate::session::SessionManager;

/// Builds the `Authorization` header value for a session, if it may be used at `now`.
///
/// An expired session never yields a header.
pub fn authorization_header(session: Option<&Session>, now: DateTime<Utc>) -> Option<String> {
    session
        .filter(|session| session.is_valid_at(now))
        .map(|session| format!("Bearer {}", session.id_token))
}

pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionManager>,
    base_url: String,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionManager>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            session,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn get(&self, path: &str) -> PortResult<Value> {
        self.request::<()>(Method::Get, path, None).await
    }

    pub async fn post<B: Serialize + Sync + ?Sized>(&self, path: &str, body: &B) -> PortResult<Value> {
        self.request(Method::Post, path, Some(body)).await
    }

    pub async fn put<B: Serialize + Sync + ?Sized>(&self, path: &str, body: &B) -> PortResult<Value> {
        self.request(Method::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> PortResult<Value> {
        self.request::<()>(Method::Delete, path, None).await
    }

    /// Sends one request. An empty response body comes back as `Value::Null`.
    ///
    /// There is no retry: every failure reaches the caller immediately.
    pub async fn request<B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> PortResult<Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut headers = Vec::new();
        match authorization_header(self.session.active_session().as_ref(), Utc::now()) {
            Some(value) => headers.push(("Authorization".to_string(), value)),
            None => debug!(%url, "No active session; sending request without a bearer token"),
        }

        let body = match body {
            Some(body) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                Some(serde_json::to_string(body).map_err(|e| PortError::Unexpected(e.to_string()))?)
            }
            None => None,
        };

        debug!(%method, %url, "Sending API request");
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers,
                body,
            })
            .await?;
        debug!(status = response.status, "Received API response");

        self.handle_response(response)
    }

    fn handle_response(&self, response: HttpResponse) -> PortResult<Value> {
        let data = if response.body.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(&response.body))
        };

        if response.is_success() {
            return match data {
                None => Ok(Value::Null),
                Some(parsed) => Ok(parsed?),
            };
        }

        let status = response.status;
        let message = data
            .and_then(Result::ok)
            .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                if response.status_text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    response.status_text.clone()
                }
            });

        if matches!(status, 401 | 403) && self.session.has_session() {
            warn!(status, "Authorization rejected by the API; ending the local session");
            self.session.sign_out();
            return Err(PortError::AuthExpired { status, message });
        }

        Err(PortError::Http { status, message })
    }
}
