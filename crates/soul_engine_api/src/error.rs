use std::fmt;

use reqwest::StatusCode;
use serde_json::{Error as JsonError, Value};

#[derive(Debug)]
pub enum SoulEngineApiError {
    MissingSoulId,
    InvalidHost(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    MissingToken,
}

impl fmt::Display for SoulEngineApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSoulId => write!(f, "soul id is required"),
            Self::InvalidHost(value) => write!(f, "invalid HTTP host: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "malformed token response: {error}"),
            Self::MissingToken => write!(f, "token missing from response"),
        }
    }
}

impl std::error::Error for SoulEngineApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SoulEngineApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for SoulEngineApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl SoulEngineApiError {
    /// True when the server answered but the answer was unusable.
    #[must_use]
    pub fn is_response_error(&self) -> bool {
        matches!(self, Self::Serde(_) | Self::MissingToken)
    }
}

/// Extracts a readable message from an error response body.
///
/// The token endpoint answers `{"error": "<text>"}`; an `{"error": {"message": ..}}`
/// envelope is accepted as well. Anything else falls back to the raw body, then to the
/// status' canonical reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) {
        let message = match object.get("error") {
            Some(Value::String(message)) => Some(message.as_str()),
            Some(Value::Object(error)) => error.get("message").and_then(Value::as_str),
            _ => None,
        };
        if let Some(message) = message.map(str::trim).filter(|value| !value.is_empty()) {
            return message.to_string();
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}
