//! crates/lesson_planner_core/src/api/mod.rs
//!
//! Resource API clients: thin endpoint mappings over `ApiClient`. They turn
//! typed requests into paths and bodies and cast parsed JSON back into the
//! expected shapes. No caching, retries or validation live here.

pub mod chat;
pub mod lessons;
pub mod plans;
pub mod profiles;

pub use chat::ChatApi;
pub use lessons::LessonApi;
pub use plans::PlanApi;
pub use profiles::ProfileApi;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ports::{PortError, PortResult};

/// The `{ message, <item>? }` body returned by save endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResponse<R> {
    pub message: Option<String>,
    pub entity: Option<R>,
}

impl<R: DeserializeOwned> SaveResponse<R> {
    /// Reads a save response whose entity sits under `key`. An empty body is
    /// a save without an echoed entity.
    pub fn decode(value: Value, key: &str) -> PortResult<Self> {
        match value {
            Value::Null => Ok(Self {
                message: None,
                entity: None,
            }),
            Value::Object(mut map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let entity = match map.remove(key) {
                    None | Some(Value::Null) => None,
                    Some(item) => Some(serde_json::from_value(item)?),
                };
                Ok(Self { message, entity })
            }
            other => Err(PortError::Decode(format!(
                "expected a save response object, got {other}"
            ))),
        }
    }
}

/// Reads a list response in either shape the backend produces.
///
/// The envelope (`{ "<key>": [...] }`) is tried first, then a bare array.
/// Anything else fails closed.
pub fn decode_list<T: DeserializeOwned>(value: Value, key: &str) -> PortResult<Vec<T>> {
    match value {
        Value::Object(mut map) => match map.remove(key) {
            Some(items @ Value::Array(_)) => Ok(serde_json::from_value(items)?),
            Some(other) => Err(PortError::Decode(format!(
                "`{key}` is not a list: {other}"
            ))),
            None => Err(PortError::Decode(format!(
                "response has no `{key}` list"
            ))),
        },
        items @ Value::Array(_) => Ok(serde_json::from_value(items)?),
        other => Err(PortError::Decode(format!(
            "expected a `{key}` list, got {other}"
        ))),
    }
}

/// Casts a response body, treating an empty body as the type's default.
pub fn decode_or_default<T: DeserializeOwned + Default>(value: Value) -> PortResult<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value)?)
}

/// Surfaces `{ "error": "..." }` bodies that arrive with a success status.
pub fn ensure_not_rejected(value: &Value) -> PortResult<()> {
    match value.get("error").and_then(Value::as_str) {
        Some(message) => Err(PortError::Rejected(message.to_string())),
        None => Ok(()),
    }
}

/// Percent-encodes one path segment (ids, profile names).
pub(crate) fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}
