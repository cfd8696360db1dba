//! Common error types for worldsync.

use thiserror::Error;

/// Top-level error type for provider, registry and dispatch operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A provider (or provider kind) with this name is already registered.
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Provider-defined failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Backend temporarily unreachable. Safe to retry.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The background dispatcher is stopped or dropped a job.
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),
}

impl Error {
    /// Whether the failure is transient and the operation may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unavailable(_) => true,
            Error::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Unavailable("offline".into()).is_transient());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_transient());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_transient());
        assert!(!Error::AlreadyRegistered("dropbox".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = Error::AlreadyRegistered("dropbox".into());
        assert_eq!(err.to_string(), "Already registered: dropbox");
    }
}
