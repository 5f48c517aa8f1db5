//! Error types for es-reindex.
//!
//! Transport and protocol errors are fatal for a run. Per-document write
//! failures are not errors at all: they are reported as
//! [`Outcome::Failed`](crate::document::Outcome) and collected.

use thiserror::Error;

/// Result type alias for es-reindex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort a migration run.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection refused, DNS failure, reset or timeout: the request got no
    /// usable answer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A whole request was answered with a non-success HTTP status.
    #[error("Transport error: {context} HTTP {status}: {body}")]
    HttpStatus {
        /// Which request failed, e.g. `scroll advance`.
        context: String,
        /// Response status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// The remote side answered with something that does not match the
    /// expected scroll or bulk schema.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials were missing or rejected.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Local IO error (file sink, JSON-lines source).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Builds a transport error from a failed `reqwest` call, keeping the
    /// timeout/connect distinction in the message.
    pub fn from_reqwest(context: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        Self::Transport(format!("{context} {kind}: {err}"))
    }

    /// Returns true for errors that came from the network rather than from
    /// the payload or the local machine.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::HttpStatus { .. })
    }

    /// Status code of a rejected request, if that is what this error is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest("HTTP", &err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Protocol("missing _scroll_id".to_string());
        assert_eq!(err.to_string(), "Protocol error: missing _scroll_id");
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::Transport("refused".to_string()).is_transport());
        assert!(!Error::Protocol("bad".to_string()).is_transport());

        let rejected = Error::HttpStatus {
            context: "bulk".to_string(),
            status: 413,
            body: "too large".to_string(),
        };
        assert!(rejected.is_transport());
        assert_eq!(rejected.status(), Some(413));
        assert_eq!(
            rejected.to_string(),
            "Transport error: bulk HTTP 413: too large"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
