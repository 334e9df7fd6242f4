//! Uniform response envelope and list normalization
//!
//! Every capability call returns `ApiResponse<T>`: `success` is true exactly
//! when the HTTP status is 2xx, `status` is 0 for transport failures, and
//! `kind` says which failure path produced `error`.
//!
//! List endpoints answer in several shapes (bare array, DRF-style
//! `{count, results}`, `{data: [...]}`, `{data: {results}}`, `{items}`).
//! `ListEnvelope<T>` deserializes from any of them so callers only ever see
//! `{items, total}`.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Which failure path produced an envelope's `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network unreachable, DNS, TLS, timeout; `status` is 0.
    Transport,
    /// 401 that session recovery could not resolve; credentials were cleared.
    Unauthorized,
    /// Non-2xx with the backend's message.
    Application,
    /// 2xx whose non-empty body is not valid JSON.
    MalformedBody,
    /// 2xx with valid JSON that does not match the expected shape.
    Decode,
}

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized - Please log in again";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Request failed";

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, status: u16) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status,
            kind: None,
        }
    }

    pub fn failure(status: u16, error: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            success: status_is_success(status),
            data: None,
            error: Some(error.into()),
            status,
            kind: Some(kind),
        }
    }

    pub fn transport(error: impl Into<String>) -> Self {
        Self::failure(0, error, FailureKind::Transport)
    }

    pub fn unauthorized() -> Self {
        Self::failure(401, UNAUTHORIZED_MESSAGE, FailureKind::Unauthorized)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == Some(FailureKind::Unauthorized)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            status: self.status,
            kind: self.kind,
        }
    }

    /// Collapse into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<T, ApiFailure> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(ApiFailure {
                status: self.status,
                kind: self.kind.unwrap_or(FailureKind::Decode),
                message: self
                    .error
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            }),
        }
    }
}

/// Error side of `ApiResponse::into_result`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct ApiFailure {
    pub status: u16,
    pub kind: FailureKind,
    pub message: String,
}

pub(crate) fn status_is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Parse a response body. An empty body is `null`, not an error.
pub(crate) fn parse_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
}

/// Backend error message: `message`, then `detail`, then `error`.
pub(crate) fn error_message(body: &Value) -> Option<String> {
    ["message", "detail", "error"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null | Value::String(_) => None,
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or_else(|| Some(v.to_string())),
            other => Some(other.to_string()),
        })
}

/// Message for a non-2xx body, falling back to `DEFAULT_FAILURE_MESSAGE`.
pub(crate) fn failure_message(body: &[u8]) -> String {
    parse_body(body)
        .ok()
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
}

/// Build the envelope for a received response.
pub(crate) fn from_body<T: DeserializeOwned>(status: u16, body: &[u8]) -> ApiResponse<T> {
    if !status_is_success(status) {
        return ApiResponse::failure(status, failure_message(body), FailureKind::Application);
    }

    let value = match parse_body(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(status, error = %e, "response body is not valid JSON");
            return ApiResponse::failure(
                status,
                format!("malformed response body: {e}"),
                FailureKind::MalformedBody,
            );
        }
    };

    match serde_json::from_value(value) {
        Ok(data) => ApiResponse::ok(data, status),
        Err(e) => {
            warn!(status, error = %e, "response body has an unexpected shape");
            ApiResponse::failure(
                status,
                format!("unexpected response shape: {e}"),
                FailureKind::Decode,
            )
        }
    }
}

/// Normalized list payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEnvelope<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Default for ListEnvelope<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ListEnvelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(normalize_list(value))
    }
}

/// Normalize any known list shape. Unknown shapes yield an empty list;
/// entries that fail to decode are skipped.
pub fn normalize_list<T: DeserializeOwned>(value: Value) -> ListEnvelope<T> {
    let (raw_items, declared_total) = split_list(value);
    let raw_len = raw_items.len();

    let items: Vec<T> = raw_items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(index, error = %e, "skipping list entry that does not decode");
                None
            }
        })
        .collect();

    let total = declared_total.unwrap_or(raw_len);
    ListEnvelope { items, total }
}

fn split_list(value: Value) -> (Vec<Value>, Option<usize>) {
    match value {
        Value::Array(items) => (items, None),
        Value::Object(mut obj) => {
            let total = ["count", "total"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_u64))
                .map(|n| n as usize);
            for key in ["results", "items", "data"] {
                match obj.remove(key) {
                    Some(Value::Array(items)) => return (items, total),
                    Some(nested @ Value::Object(_)) => {
                        let (items, nested_total) = split_list(nested);
                        return (items, total.or(nested_total));
                    }
                    _ => {}
                }
            }
            (Vec::new(), total)
        }
        _ => (Vec::new(), None),
    }
}
