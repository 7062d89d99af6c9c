//! In-memory stand-ins for the ports, shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::domain::{Claims, Session};
use crate::ports::{
    AuthorizationRequest, HttpRequest, HttpResponse, HttpTransport, IdentityProvider, Navigation,
    Navigator, PortError, PortResult,
};
use crate::request::ApiClient;
use crate::session::{SessionManager, SessionSettings};

pub fn session_expiring_in(ttl: chrono::Duration) -> Session {
    Session {
        id_token: "id-token".to_string(),
        access_token: "access-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expires_at: Utc::now() + ttl,
        claims: Claims {
            subject: "teacher-1".to_string(),
            email: Some("teacher@school.test".to_string()),
            name: Some("Ms. Rivera".to_string()),
        },
    }
}

//=========================================================================================
// Transport
//=========================================================================================

struct Scripted {
    gate: Option<Arc<Notify>>,
    reply: PortResult<HttpResponse>,
}

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "",
    }
}

fn response(status: u16, body: String) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text(status).to_string(),
        body,
    }
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, gate: Option<Arc<Notify>>, reply: PortResult<HttpResponse>) {
        self.script.lock().push_back(Scripted { gate, reply });
    }

    pub fn reply_json(&self, status: u16, body: Value) {
        self.push(None, Ok(response(status, body.to_string())));
    }

    pub fn reply_text(&self, status: u16, body: &str) {
        self.push(None, Ok(response(status, body.to_string())));
    }

    pub fn fail(&self, err: PortError) {
        self.push(None, Err(err));
    }

    /// Queues a reply that is held back until the returned gate is notified.
    pub fn reply_json_gated(&self, status: u16, body: Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(Some(gate.clone()), Ok(response(status, body.to_string())));
        gate
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> PortResult<HttpResponse> {
        let next = self.script.lock().pop_front();
        self.requests.lock().push(request);
        let Some(scripted) = next else {
            return Err(PortError::Unexpected("no scripted reply left".to_string()));
        };
        if let Some(gate) = scripted.gate {
            gate.notified().await;
        }
        scripted.reply
    }
}

//=========================================================================================
// Identity provider & navigation
//=========================================================================================

#[derive(Default)]
pub struct StubProvider {
    exchange: Mutex<Option<PortResult<Option<Session>>>>,
    refresh: Mutex<Option<PortResult<Session>>>,
    exchanged: Mutex<Vec<(String, String)>>,
    refresh_calls: AtomicUsize,
    logout: Mutex<Option<PortResult<String>>>,
}

impl StubProvider {
    pub fn set_exchange(&self, result: PortResult<Option<Session>>) {
        *self.exchange.lock() = Some(result);
    }

    pub fn set_refresh(&self, result: PortResult<Session>) {
        *self.refresh.lock() = Some(result);
    }

    /// Overrides the logout URL, or makes building it fail.
    pub fn set_logout(&self, result: PortResult<String>) {
        *self.logout.lock() = Some(result);
    }

    pub fn exchanged_codes(&self) -> Vec<(String, String)> {
        self.exchanged.lock().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn authorization_request(&self) -> PortResult<AuthorizationRequest> {
        Ok(AuthorizationRequest {
            url: "https://auth.test/oauth2/authorize?client_id=client&state=state-1".to_string(),
            state: "state-1".to_string(),
            code_verifier: "verifier-1".to_string(),
        })
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> PortResult<Option<Session>> {
        self.exchanged
            .lock()
            .push((code.to_string(), code_verifier.to_string()));
        self.exchange
            .lock()
            .clone()
            .unwrap_or_else(|| Err(PortError::Unexpected("no exchange scripted".to_string())))
    }

    async fn refresh(&self, _refresh_token: &str) -> PortResult<Session> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh
            .lock()
            .clone()
            .unwrap_or_else(|| Err(PortError::Unexpected("no refresh scripted".to_string())))
    }

    fn logout_url(&self, id_token_hint: Option<&str>) -> PortResult<String> {
        if let Some(result) = self.logout.lock().clone() {
            return result;
        }
        let mut url = "https://auth.test/logout?client_id=client".to_string();
        if let Some(hint) = id_token_hint {
            url.push_str(&format!("&id_token_hint={hint}"));
        }
        Ok(url)
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn last(&self) -> Option<Navigation> {
        self.visits.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, to: Navigation) {
        self.visits.lock().push(to);
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub fn signed_out_manager() -> (Arc<SessionManager>, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let manager = SessionManager::new(
        Arc::new(StubProvider::default()),
        navigator.clone(),
        SessionSettings::default(),
    );
    (manager, navigator)
}

pub fn signed_in_manager() -> (Arc<SessionManager>, Arc<RecordingNavigator>) {
    let (manager, navigator) = signed_out_manager();
    manager.restore_session(session_expiring_in(chrono::Duration::hours(1)));
    (manager, navigator)
}

pub fn api_client(transport: &Arc<ScriptedTransport>, manager: &Arc<SessionManager>) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(
        transport.clone(),
        manager.clone(),
        "https://api.test/",
    ))
}
