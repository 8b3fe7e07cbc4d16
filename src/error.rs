//! Typed errors for backend and channel operations.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Appended to error text when the Ollama server cannot be reached.
pub const UNREACHABLE_HINT: &str =
    "Could not reach the Ollama server. Make sure it is running (start it with `ollama serve`) and try again.";

/// Failures reported by a [`ChatBackend`](crate::backend::ChatBackend).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    /// The server could not be reached at all (connection refused, DNS, etc.)
    #[error("fetch failed: {0}")]
    Connection(String),

    /// The server answered with a non-success HTTP status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// The response body broke off while streaming.
    #[error("stream error: {0}")]
    Stream(String),

    /// The server reported an error inside the stream.
    #[error("{0}")]
    Api(String),

    /// A response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

fn unreachable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)fetch failed|connection refused|econnrefused")
            .expect("static pattern is valid")
    })
}

impl BackendError {
    /// Convert a transport error from reqwest.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() {
            BackendError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            BackendError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Stream(e.to_string())
        }
    }

    /// Build an error from an HTTP status and the response body.
    ///
    /// Ollama reports failures as `{"error": "..."}`; that message is used
    /// when present, otherwise the raw body.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    trimmed.to_string()
                }
            });
        BackendError::Status {
            status: status.as_u16(),
            message,
        }
    }

    /// Whether the failure means the backend service is not running.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Connection(_))
            || unreachable_pattern().is_match(&self.to_string())
    }

    /// Text shown to the user in the response area.
    pub fn user_message(&self) -> String {
        let mut message = format!("Error: {}", self);
        if self.is_unreachable() {
            message.push_str("\n\n");
            message.push_str(UNREACHABLE_HINT);
        }
        message
    }
}

/// The other end of a message channel has gone away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("channel closed")]
pub struct ChannelClosed;
