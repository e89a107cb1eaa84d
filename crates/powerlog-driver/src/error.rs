/// Errors that can occur in driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] powerlog_transport::TransportError),

    /// Line framing error.
    #[error("line error: {0}")]
    Line(#[from] powerlog_line::LineError),

    /// A frame field is not a number. Invalidates the whole frame.
    #[error("field {field:?} is not a number in frame {line:?}")]
    Parse { field: String, line: String },

    /// A frame does not carry one value per selected quantity.
    #[error("frame has {actual} values, selection has {expected}")]
    FrameLength { expected: usize, actual: usize },

    /// The operation is not allowed while continuous mode is active.
    #[error("{operation} not allowed while streaming; stop continuous mode first")]
    Streaming { operation: &'static str },

    /// The value selection is unusable.
    #[error("invalid value selection: {0}")]
    InvalidSelection(String),

    /// Per-channel range setup needs explicit current and voltage ranges.
    #[error("{channels}-channel range setup needs both a current and a voltage range")]
    MissingRange { channels: u8 },
}

impl DriverError {
    /// Whether the error concerns one frame only; the stream itself is intact.
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self,
            DriverError::Parse { .. } | DriverError::FrameLength { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
