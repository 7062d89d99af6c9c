//! crates/lesson_planner_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! session and synchronization logic independent of the concrete HTTP stack,
//! the identity provider, and whatever shell hosts the UI.

use async_trait::async_trait;
use std::fmt;

use crate::domain::Session;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// Failures raised while completing an identity-provider sign-in callback.
///
/// The `Display` text is the message shown on the sign-in page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("Please log in again")]
    LoginRequired,
    #[error("Invalid credentials")]
    InvalidGrant,
    #[error("No user data received")]
    MissingSession,
    #[error("{0}")]
    Provider(String),
}

impl CallbackError {
    /// Classifies an OAuth error code (optionally with its description).
    pub fn from_provider_code(code: &str, description: Option<&str>) -> Self {
        if code.contains("login_required") {
            Self::LoginRequired
        } else if code.contains("invalid_grant") {
            Self::InvalidGrant
        } else {
            Self::Provider(description.unwrap_or(code).to_string())
        }
    }
}

/// A generic error type for all port operations.
///
/// HTTP failures display as the bare server message so stores can hand it
/// straight to the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),
    #[error("{message}")]
    Http { status: u16, message: String },
    /// A 401/403 while a session was installed; the session has been ended.
    #[error("{message}")]
    AuthExpired { status: u16, message: String },
    /// A client-side precondition failed before any request was sent.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    #[error("Unexpected response shape: {0}")]
    Decode(String),
    /// A success response whose body reports an error.
    #[error("{0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl From<serde_json::Error> for PortError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// HTTP Transport Port
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully prepared outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response whose body has been read to completion as text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and reads the whole body. Only transport failures are
    /// errors here; non-2xx statuses are returned as responses.
    async fn send(&self, request: HttpRequest) -> PortResult<HttpResponse>;
}

//=========================================================================================
// Identity Provider Port
//=========================================================================================

/// Everything needed to start an authorization-code redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds a fresh authorization URL with its own state and PKCE verifier.
    fn authorization_request(&self) -> PortResult<AuthorizationRequest>;

    /// Exchanges an authorization code for a session.
    ///
    /// `Ok(None)` means the provider answered without usable session data.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> PortResult<Option<Session>>;

    /// Obtains a renewed session from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> PortResult<Session>;

    /// The provider's logout endpoint for remote session termination.
    fn logout_url(&self, id_token_hint: Option<&str>) -> PortResult<String>;
}

//=========================================================================================
// Navigation Port
//=========================================================================================

/// Where the host shell should take the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Leave the application (e.g. to the identity provider).
    External(String),
    /// An in-app route, optionally carrying an error for display.
    Route { path: String, error: Option<String> },
}

impl Navigation {
    pub fn route(path: impl Into<String>) -> Self {
        Self::Route {
            path: path.into(),
            error: None,
        }
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, to: Navigation);
}
