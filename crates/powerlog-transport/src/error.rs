use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The terminator was not observed before the read deadline.
    ///
    /// `discarded` counts the bytes of an unterminated partial line that were
    /// dropped instead of being handed to the caller.
    #[error("no terminator received within {timeout:?} ({discarded} partial bytes discarded)")]
    Timeout { timeout: Duration, discarded: usize },

    /// The remote end closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// The transport is not connected (never opened, or already closed).
    #[error("transport not connected")]
    NotConnected,
}

impl TransportError {
    /// Whether this error is a read deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
