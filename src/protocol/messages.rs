//! Request and response message types

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{Error, PROXY_ERROR_PREFIX, Result};

/// Request mode understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Arithmetic expression evaluation (`data.expr`)
    Calc,
    /// Language-model prompt (`data.prompt`)
    Gpt,
}

impl Mode {
    /// Wire name of the mode
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calc => "calc",
            Self::Gpt => "gpt",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-expressed request options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Caching preference. The proxy caches uniformly; the flag only
    /// participates in the cache key.
    #[serde(default)]
    pub cache: bool,
}

/// Typed view of a client request
///
/// Used to validate a parsed line at the boundary. The proxy forwards and
/// keys the parsed JSON value, so fields outside this view survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request mode
    pub mode: Mode,
    /// Mode-specific payload
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Request options
    #[serde(default)]
    pub options: RequestOptions,
}

impl Request {
    /// Validate a parsed JSON line as a request
    ///
    /// Rejects non-objects, missing or unknown `mode`, non-object `data`
    /// and non-boolean `options.cache`.
    pub fn validate(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| Error::InvalidRequest(e.to_string()))
    }
}

/// Error text of a `{"ok": false, "error": "..."}` response
///
/// Any other shape yields `None`; the response is relayed untouched either way.
#[must_use]
pub fn failure_detail(response: &Value) -> Option<&str> {
    match response.get("ok").and_then(Value::as_bool) {
        Some(false) => response.get("error").and_then(Value::as_str),
        _ => None,
    }
}

/// Build a proxy-origin failure response
pub fn proxy_error(detail: impl Display) -> Value {
    json!({"ok": false, "error": format!("{PROXY_ERROR_PREFIX}: {detail}")})
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_calc_request() {
        let value = json!({"mode": "calc", "data": {"expr": "2+2"}, "options": {"cache": true}});
        let request = Request::validate(&value).unwrap();

        assert_eq!(request.mode, Mode::Calc);
        assert_eq!(request.data.get("expr"), Some(&json!("2+2")));
        assert!(request.options.cache);
    }

    #[test]
    fn test_validate_defaults_data_and_options() {
        let request = Request::validate(&json!({"mode": "gpt"})).unwrap();

        assert_eq!(request.mode, Mode::Gpt);
        assert!(request.data.is_empty());
        assert_eq!(request.options, RequestOptions::default());
    }

    #[test]
    fn test_validate_rejects_unknown_mode() {
        let err = Request::validate(&json!({"mode": "shell", "data": {}})).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(err.to_string().contains("shell"));
    }

    #[test]
    fn test_validate_rejects_malformed_shapes() {
        for value in [
            json!(42),
            json!(["calc"]),
            json!({"data": {"expr": "1"}}),
            json!({"mode": "calc", "data": "1+1"}),
            json!({"mode": "calc", "options": {"cache": "yes"}}),
        ] {
            assert!(
                matches!(Request::validate(&value), Err(Error::InvalidRequest(_))),
                "accepted {value}"
            );
        }
    }

    #[test]
    fn test_failure_detail() {
        let failed = json!({"ok": false, "error": "division by zero"});
        assert_eq!(failure_detail(&failed), Some("division by zero"));

        assert_eq!(failure_detail(&json!({"ok": true, "result": 4.0})), None);
        assert_eq!(failure_detail(&json!({"ok": false})), None);
        assert_eq!(failure_detail(&json!({"status": "?"})), None);
    }

    #[test]
    fn test_proxy_error_prefix() {
        assert_eq!(
            proxy_error("backend closed connection unexpectedly"),
            json!({"ok": false, "error": "Proxy: backend closed connection unexpectedly"})
        );
    }
}
