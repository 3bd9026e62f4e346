//! Unified error types for the plume client.

/// Result type alias for plume operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the plume client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid configuration (credentials, base URL, headers).
    #[error("configuration error: {0}")]
    Config(String),

    /// The API rejected the request with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Error message, decoded from the response body when possible.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an API error from a status code and message.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_creates_error() {
        let err = Error::config("no API key");
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("no API key"));
    }

    #[test]
    fn api_creates_error() {
        let err = Error::api(401, "Invalid API key");
        assert!(matches!(err, Error::Api { status: 401, .. }));
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
