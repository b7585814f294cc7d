use std::path::PathBuf;

/// Errors that can occur in named pipe operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The pipe identity already exists and cannot be created again.
    #[error("named pipe already exists: {path}")]
    Exists { path: PathBuf },

    /// The pipe identity does not exist.
    #[error("named pipe does not exist: {path}")]
    NotFound { path: PathBuf },

    /// The path exists but is not a named pipe.
    #[error("not a named pipe: {path}")]
    NotAPipe { path: PathBuf },

    /// Opening kept failing with a rendezvous error until the retry budget ran out.
    #[error("failed to open {path} after {attempts} attempt(s): {source}")]
    RetryExhausted {
        path: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    /// Opening failed with an error that retrying cannot fix.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `open` was called on an endpoint that is already open.
    #[error("pipe endpoint is already open")]
    AlreadyOpen,

    /// `close` or I/O was attempted on an endpoint that is not open.
    #[error("pipe endpoint is not open")]
    NotOpen,

    /// The pipe name cannot be used as an OS identity.
    #[error("invalid pipe name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// An I/O error occurred on the pipe handle.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation is not available on this platform.
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;

