//! Error types for transport operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while reading from or writing to a socket.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error reported by the socket layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller's cancellation token fired.
    #[error("Operation was cancelled")]
    Cancelled,

    /// The stream has already been disconnected.
    #[error("Stream is not connected")]
    NotConnected,

    /// Operation that a forward-only socket stream cannot perform.
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    /// A finite timeout of zero was requested.
    #[error("Invalid timeout: {0:?}")]
    InvalidTimeout(Duration),
}

impl Error {
    /// Returns true if the operation was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the stream was already disconnected.
    #[must_use]
    pub const fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Cancelled => Self::new(io::ErrorKind::Interrupted, err),
            Error::NotConnected => Self::new(io::ErrorKind::NotConnected, err),
            Error::NotSupported(_) => Self::new(io::ErrorKind::Unsupported, err),
            Error::InvalidTimeout(_) => Self::new(io::ErrorKind::InvalidInput, err),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
