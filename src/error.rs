//! Error types for the Sumo client.

use thiserror::Error;

/// Result type alias for Sumo client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Sumo client.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Request Errors =====
    #[error("Request failed: {status} {status_text} - {message}")]
    Request {
        status: u16,
        status_text: String,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ===== Authentication Errors =====
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Token cache error: {0}")]
    Cache(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] oauth2::url::ParseError),

    // ===== HTTP Errors =====
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    // ===== Internal Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a request error from HTTP response details.
    pub fn request(
        status: u16,
        status_text: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Request {
            status,
            status_text: status_text.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retriable (transient transport failures).
    ///
    /// Only connect errors and timeouts qualify. Terminal status errors are
    /// never retried; retryable statuses are judged on the response itself.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// HTTP status carried by a terminal request error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let req_err = Error::request(404, "Not Found", "Resource not found");
        assert_eq!(
            req_err.to_string(),
            "Request failed: 404 Not Found - Resource not found"
        );

        let auth_err = Error::Auth("Access token has expired".to_string());
        assert_eq!(
            auth_err.to_string(),
            "Authentication error: Access token has expired"
        );

        let arg_err = Error::InvalidArgument("Both blob and json given to post".to_string());
        assert_eq!(
            arg_err.to_string(),
            "Invalid argument: Both blob and json given to post"
        );
    }

    #[test]
    fn test_error_is_retriable() {
        // Terminal statuses are never retried, whatever the code
        assert!(!Error::request(503, "Service Unavailable", "").is_retriable());
        assert!(!Error::request(404, "Not Found", "").is_retriable());

        assert!(!Error::Auth("expired".to_string()).is_retriable());
        assert!(!Error::InvalidArgument("both".to_string()).is_retriable());
        assert!(!Error::Cache("locked".to_string()).is_retriable());
    }

    #[test]
    fn test_request_error_constructor() {
        let err = Error::request(400, "Bad Request", "schema validation failed");
        assert_eq!(err.status(), Some(400));
        match err {
            Error::Request {
                status,
                status_text,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(status_text, "Bad Request");
                assert_eq!(message, "schema validation failed");
            }
            _ => panic!("Expected Request error"),
        }
    }

    #[test]
    fn test_status_only_on_request_errors() {
        assert_eq!(Error::Config("bad env".to_string()).status(), None);
        assert_eq!(Error::Internal("x".to_string()).status(), None);
    }
}
