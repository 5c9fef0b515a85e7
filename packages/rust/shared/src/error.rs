//! Error types for colgen.
//!
//! Library crates use [`ColgenError`] and [`ProviderError`] via `thiserror`.
//! The CLI wraps these with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all colgen operations.
#[derive(Debug, thiserror::Error)]
pub enum ColgenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A completion backend failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Dataset shape or content error (unknown column, bad record, ...).
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Template lookup error (unknown preset, unreadable user library).
    #[error("template error: {0}")]
    Template(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (out-of-range option, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ColgenError>;

impl ColgenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single completion call.
///
/// Every variant carries enough text to be shown to an operator as-is.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP client could not be constructed (bad base URL, TLS setup...).
    #[error("provider client error: {0}")]
    Client(String),

    /// Connection-level failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its deadline.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not contain the expected field.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Build a status error, truncating long bodies so log lines stay readable.
    pub fn status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let body = match body.char_indices().nth(200) {
            Some((cut, _)) => format!("{}…", &body[..cut]),
            None => body.to_string(),
        };
        Self::Status { status, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ColgenError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ColgenError::validation("workers must be between 1 and 8");
        assert!(err.to_string().contains("between 1 and 8"));
    }

    #[test]
    fn provider_error_is_transparent() {
        let err = ColgenError::from(ProviderError::Timeout(Duration::from_secs(120)));
        assert_eq!(err.to_string(), "request timed out after 120s");
    }

    #[test]
    fn status_error_truncates_body() {
        let body = "x".repeat(500);
        match ProviderError::status(502, &body) {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.chars().count(), 201);
                assert!(body.ends_with('…'));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }
}
