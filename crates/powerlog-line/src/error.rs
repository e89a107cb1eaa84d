/// Errors that can occur while framing commands and responses.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] powerlog_transport::TransportError),

    /// The command text would break line framing.
    #[error("command contains a line terminator or non-ASCII byte: {0:?}")]
    InvalidCommand(String),

    /// The response line is not valid UTF-8.
    #[error("response is not valid UTF-8 ({0} bytes)")]
    Encoding(usize),
}

pub type Result<T> = std::result::Result<T, LineError>;
