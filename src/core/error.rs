//! # Error Handling Module
//!
//! Every failure the data provider can observe is described by [`ProviderError`].
//! Remote failures are classified the same way the storefront pages render them:
//! transport problems, authorization problems (401/403 with fixed user-facing
//! wording) and application errors carrying the backend's own `message`.
//!
//! `ProviderError` is `Clone` because a single failed fetch is handed to every
//! caller that joined the same in-flight request.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Message shown when the backend answers 401.
pub const UNAUTHORIZED_MESSAGE: &str = "You are not logged in. Please log in to get access.";

/// Message shown when the backend answers 403.
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";

/// Result type used throughout the crate
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error types for the data provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request never reached the server (DNS, connection refused, timeout)
    #[error("Network error: {message}")]
    Network { message: String },

    /// 401 from the backend
    #[error("{message}")]
    Unauthorized { message: String },

    /// 403 from the backend
    #[error("{message}")]
    Forbidden { message: String },

    /// Any other non-2xx response
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded into the expected shape
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors (config files, listener binding)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Unexpected failures inside the provider itself
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    /// Create a network error with a custom message
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create the fixed 401 error
    pub fn unauthorized() -> Self {
        Self::Unauthorized {
            message: UNAUTHORIZED_MESSAGE.to_string(),
        }
    }

    /// Create the fixed 403 error
    pub fn forbidden() -> Self {
        Self::Forbidden {
            message: FORBIDDEN_MESSAGE.to_string(),
        }
    }

    /// Create an application error for a non-2xx status
    pub fn api<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a decode error with a custom message
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map an HTTP status and optional backend message to an error.
    ///
    /// 401 and 403 always use the fixed wording regardless of what the
    /// backend sent.
    pub fn from_status(status: u16, backend_message: Option<String>) -> Self {
        match status {
            401 => Self::unauthorized(),
            403 => Self::forbidden(),
            _ => Self::api(
                status,
                backend_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Request failed with status {}", status)),
            ),
        }
    }

    /// The human-readable message recorded in the error state for a key
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// True for 401/403
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Forbidden { .. })
    }

    /// Check if retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get the HTTP status code used when this error is rendered by the debug panel
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Network { .. } => StatusCode::BAD_GATEWAY,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Api { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Decode { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } => StatusCode::BAD_REQUEST,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network_error",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::Api { .. } => "api_error",
            Self::Decode { .. } => "decode_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Io { .. } => "io_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ProviderError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), None);
        }
        if err.is_decode() {
            return Self::decode(err.to_string());
        }
        Self::network(err.to_string())
    }
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.message(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_statuses_use_fixed_messages() {
        let err = ProviderError::from_status(401, Some("jwt expired".to_string()));
        assert_eq!(err, ProviderError::unauthorized());
        assert_eq!(err.message(), UNAUTHORIZED_MESSAGE);
        assert!(err.is_authorization());

        let err = ProviderError::from_status(403, None);
        assert_eq!(err.message(), FORBIDDEN_MESSAGE);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_backend_message_is_preserved() {
        let err = ProviderError::from_status(404, Some("No tour found with that ID".to_string()));
        assert_eq!(err.message(), "No tour found with that ID");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_backend_message_falls_back() {
        let err = ProviderError::from_status(500, Some("   ".to_string()));
        assert_eq!(err.message(), "Request failed with status 500");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let err = ProviderError::network("connection refused");
        assert!(err.is_retryable());
        assert!(!err.is_authorization());
        assert_eq!(err.error_type(), "network_error");
        assert_eq!(err.message(), "Network error: connection refused");
    }
}
