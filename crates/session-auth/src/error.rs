//! Error taxonomy shared by every session and OAuth operation
//!
//! Callers match on the variant to decide what to show: `SessionExpired`
//! sends the user back to login, `Http` carries the backend's status and
//! parsed body for field-level messages, `Csrf`, `Configuration` and
//! `Callback` abort the current authorization attempt.

use std::fmt;

use serde_json::Value;

/// Why a CSRF state check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfFailure {
    /// No stored state for the provider in any backend
    Missing,
    /// Stored state is older than the validity window
    Expired,
    /// Stored state differs from the value echoed by the provider
    Mismatch,
}

impl CsrfFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsrfFailure::Missing => "missing",
            CsrfFailure::Expired => "expired",
            CsrfFailure::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for CsrfFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from authenticated requests and the OAuth redirect flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error or server unavailable: {0}")]
    Network(String),

    #[error("request failed with status {status}")]
    Http { status: u16, body: Value },

    #[error("session expired, please login again")]
    SessionExpired,

    #[error("invalid OAuth state ({0}), possible CSRF attack or expired session")]
    Csrf(CsrfFailure),

    #[error("OAuth is not configured: {0}")]
    Configuration(String),

    #[error("OAuth code exchange failed: {0}")]
    Exchange(String),

    /// Provider reported an error, or the callback URL is malformed
    #[error("OAuth callback rejected: {0}")]
    Callback(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Human-readable message for display.
    ///
    /// For `Http` errors this is the first string the backend put in its
    /// failure body: `message`, then `detail`, then the first entry of any
    /// field-keyed array such as `{"email": ["already registered"]}`.
    /// Everything else falls back to the `Display` text.
    pub fn message(&self) -> String {
        match self {
            Error::Http { body, .. } => {
                backend_message(body).unwrap_or_else(|| self.to_string())
            }
            other => other.to_string(),
        }
    }

    /// HTTP status the backend answered with, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Extract the first human-readable string from a failure body.
pub fn backend_message(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    for key in ["message", "detail"] {
        if let Some(text) = object.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }

    object.values().find_map(|value| match value {
        Value::Array(items) => items.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    })
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
