// Error handling module
// Defines the error types surfaced to consumers of the session client

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Errors that can occur while talking to the backend
#[derive(Error, Debug)]
pub enum ApiError {
    /// Session is gone and could not be recovered; the user must log in again
    #[error("Session expired - please log in again")]
    AuthExpired,

    /// Transport-level failure (DNS, connection reset, timeout)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Backend rejected the request for reasons unrelated to authentication
    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    /// Login was refused or returned no token
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be described (bad URL, unserializable body)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Build a backend error from a non-success status and its body.
    ///
    /// The backend reports failures as `{"message": "..."}`; when present that
    /// message is used, otherwise the (truncated) raw body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown status")
                        .to_string()
                } else {
                    truncate_body(body)
                }
            });

        ApiError::Backend {
            status: status.as_u16(),
            message,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Backend { status, .. } => Some(*status),
            ApiError::AuthExpired => Some(StatusCode::UNAUTHORIZED.as_u16()),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ApiError::AuthExpired.to_string(),
            "Session expired - please log in again"
        );

        let err = ApiError::Backend {
            status: 422,
            message: "The rate field is required.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Backend error: 422 - The rate field is required."
        );

        let err = ApiError::LoginFailed("Invalid credentials".to_string());
        assert_eq!(err.to_string(), "Login failed: Invalid credentials");
    }

    #[test]
    fn test_internal_error_message() {
        let err = ApiError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_from_status_uses_backend_message() {
        let err = ApiError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"status": "failed", "message": "No Exchange rate found!"}"#,
        );
        match err {
            ApiError::Backend { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No Exchange rate found!");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_falls_back_to_raw_body() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream unavailable");
        assert_eq!(err.to_string(), "Backend error: 502 - upstream unavailable");
    }

    #[test]
    fn test_from_status_empty_body_uses_reason() {
        let err = ApiError::from_status(StatusCode::FORBIDDEN, "");
        assert_eq!(err.to_string(), "Backend error: 403 - Forbidden");
    }

    #[test]
    fn test_from_status_truncates_long_body() {
        let body = "e".repeat(2000);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let message = err.to_string();
        assert!(message.contains("truncated, 2000 total bytes"));
        assert!(message.len() < 700);
    }

    #[test]
    fn test_status() {
        assert_eq!(ApiError::AuthExpired.status(), Some(401));
        assert_eq!(
            ApiError::from_status(StatusCode::CONFLICT, "").status(),
            Some(409)
        );
        assert_eq!(
            ApiError::InvalidRequest("bad url".to_string()).status(),
            None
        );
    }
}
