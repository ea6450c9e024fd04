//! Error types for the proxy

use std::io;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::protocol;

/// Result type alias for the proxy
pub type Result<T> = std::result::Result<T, Error>;

/// Proxy errors
///
/// The `Display` text of the per-request variants is the exact detail sent
/// to clients after [`crate::PROXY_ERROR_PREFIX`].
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Client line is not valid JSON
    #[error("invalid JSON request: {0}")]
    InvalidJsonRequest(String),

    /// Client line is JSON but not a valid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Backend connect failed or timed out
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Sending the request to the backend failed
    #[error("error forwarding to backend: {0}")]
    Forward(String),

    /// Backend closed its side before answering
    #[error("backend closed connection unexpectedly")]
    BackendClosed,

    /// I/O error while reading the backend response
    #[error("backend read error: {0}")]
    BackendRead(String),

    /// Backend did not answer within the read timeout
    #[error("backend read error: timed out after {0:?}")]
    BackendTimeout(Duration),

    /// Backend answered with a line that is not valid JSON
    #[error("invalid JSON from backend: {0}")]
    InvalidBackendJson(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the backend connection must be dropped after this error
    #[must_use]
    pub fn invalidates_backend(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_)
                | Self::Forward(_)
                | Self::BackendClosed
                | Self::BackendRead(_)
                | Self::BackendTimeout(_)
        )
    }

    /// Render as a proxy-origin failure response
    #[must_use]
    pub fn to_response(&self) -> Value {
        protocol::proxy_error(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_wire_messages() {
        assert_eq!(
            Error::BackendClosed.to_response(),
            json!({"ok": false, "error": "Proxy: backend closed connection unexpectedly"})
        );
        assert_eq!(
            Error::BackendUnavailable("Connection refused".into()).to_response(),
            json!({"ok": false, "error": "Proxy: backend unavailable: Connection refused"})
        );
        assert_eq!(
            Error::BackendTimeout(Duration::from_secs(2)).to_string(),
            "backend read error: timed out after 2s"
        );
    }

    #[test]
    fn test_invalidates_backend() {
        assert!(Error::BackendClosed.invalidates_backend());
        assert!(Error::Forward("broken pipe".into()).invalidates_backend());
        assert!(!Error::InvalidBackendJson("eof".into()).invalidates_backend());
        assert!(!Error::InvalidJsonRequest("eof".into()).invalidates_backend());
    }
}
