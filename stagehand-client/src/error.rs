//! Error types for the Stagehand broker client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the broker
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request to the REST proxy failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// REST proxy returned an error status code
    #[error("Proxy error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the proxy
        message: String,
    },

    /// Failed to parse a proxy response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Failed to serialize an outgoing record
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker accepted the request but refused the record
    #[error("Record rejected by broker: {0}")]
    Rejected(String),

    /// Broker unavailable for the requested topic
    #[error("Topic unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Check if retrying the same request may succeed
    ///
    /// Connectivity problems, timeouts, throttling and server errors are
    /// transient. Anything the proxy rejected on its merits is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
            Self::Unavailable(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ClientError::api_error(404, "missing").is_not_found());
        assert!(ClientError::api_error(503, "down").is_server_error());
        assert!(!ClientError::api_error(400, "bad").is_server_error());
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::api_error(503, "down").is_retryable());
        assert!(ClientError::api_error(429, "slow down").is_retryable());
        assert!(!ClientError::api_error(422, "bad schema").is_retryable());
        assert!(!ClientError::Rejected("too large".into()).is_retryable());
        assert!(ClientError::Unavailable("t".into()).is_retryable());
    }
}
