//! DevTools protocol error type.

use thiserror::Error;

/// Errors raised by the CDP client and page sessions.
#[derive(Debug, Error)]
pub enum CdpError {
    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A message could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The browser answered a command with an error.
    #[error("CDP error in {method}: {message} (code {code})")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    /// No answer within the protocol timeout.
    #[error("{method} timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    /// The connection went away before an answer arrived.
    #[error("DevTools connection closed")]
    Closed,

    /// A script threw inside the page.
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// The answer lacked a field the caller needs.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::WebSocket(e.to_string())
    }
}
