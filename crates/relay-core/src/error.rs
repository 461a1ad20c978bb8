use thiserror::Error;

/// A convenience `Result` alias using [`RelayError`].
pub type RelayResult<T> = Result<T, RelayError>;

/// Fallback message used when every backend failed without leaving an error behind.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Top-level error type for the Relay gateway.
///
/// The `Display` output of the request-facing variants is exactly what a
/// client sees, so changing a format string here changes the wire format.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The inbound request body failed validation.
    #[error("{0}")]
    Validation(String),

    /// A single backend attempt failed.
    #[error("{backend} service error: {message}")]
    Backend {
        /// Name of the backend that failed.
        backend: String,
        /// Provider-specific failure description.
        message: String,
    },

    /// A backend finished its stream without producing any text.
    #[error("{backend} service error: empty response")]
    EmptyResponse {
        /// Name of the backend that produced nothing.
        backend: String,
    },

    /// Every backend was tried within one session and none succeeded.
    #[error("All services failed. Last error: {last_error}")]
    Exhausted {
        /// Message of the last captured backend error.
        last_error: String,
    },

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the HTTP gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Wrap a provider failure under the backend's name.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Build the terminal error for a session that ran out of backends.
    pub fn exhausted(last_error: Option<&RelayError>) -> Self {
        Self::Exhausted {
            last_error: last_error.map_or_else(|| UNKNOWN_ERROR.to_string(), ToString::to_string),
        }
    }

    /// Returns `true` for errors attributable to one backend attempt.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::EmptyResponse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = RelayError::backend("Groq", "429 Too Many Requests");
        assert_eq!(err.to_string(), "Groq service error: 429 Too Many Requests");
        assert!(err.is_backend_failure());
    }

    #[test]
    fn test_exhausted_carries_last_error() {
        let last = RelayError::backend("Gemini", "quota exceeded");
        let err = RelayError::exhausted(Some(&last));
        assert_eq!(
            err.to_string(),
            "All services failed. Last error: Gemini service error: quota exceeded"
        );
        assert!(!err.is_backend_failure());
    }

    #[test]
    fn test_exhausted_without_error() {
        let err = RelayError::exhausted(None);
        assert_eq!(err.to_string(), "All services failed. Last error: Unknown error");
    }

    #[test]
    fn test_validation_display_is_bare() {
        let err = RelayError::Validation("Messages array cannot be empty".into());
        assert_eq!(err.to_string(), "Messages array cannot be empty");
    }
}
