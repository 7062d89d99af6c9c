//! crates/lesson_planner_core/src/domain.rs
//!
//! Defines the core data structures shared by the session manager, the request
//! client and the resource stores. Generated lesson and plan bodies are kept as
//! opaque JSON; only the fields the client itself reasons about are typed.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Session & Identity
//=========================================================================================

/// Identity claims read from the provider's ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// The authenticated identity state for the current user.
///
/// Owned by the `SessionManager`; everything else only ever sees clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub claims: Claims,
}

impl Session {
    /// A session is usable only while `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }
}

/// The basic user projection the UI displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl From<&Claims> for User {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.subject.clone(),
            email: claims.email.clone(),
            // Providers that omit `name` still give the UI something to show.
            name: claims.name.clone().or_else(|| claims.email.clone()),
        }
    }
}

//=========================================================================================
// Store-Level Types
//=========================================================================================

/// Write-side status of a resource store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// The append-only version history of one entity, as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionList<V> {
    #[serde(default = "Vec::new")]
    pub versions: Vec<V>,
    #[serde(default)]
    pub total_versions: usize,
}

impl<V> Default for VersionList<V> {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            total_versions: 0,
        }
    }
}

//=========================================================================================
// Chat Transcripts
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a lesson's chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

impl ChatMessage {
    pub fn now(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// The server's reply to a chat turn. `updated_plan` is an opaque lesson body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub chat_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_plan: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_components: Option<Vec<String>>,
}

/// Classification of a chat message against the lesson it refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub tier: u32,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub requires_foundation_update: bool,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Parses the server's `lastModified` values.
///
/// The backend emits both RFC 3339 strings and naive ISO-8601 timestamps;
/// naive values are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
