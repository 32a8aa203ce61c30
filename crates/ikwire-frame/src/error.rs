/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame's version byte does not match the local protocol version.
    #[error("protocol version mismatch (expected {expected}, got {found})")]
    VersionMismatch { expected: u8, found: u8 },

    /// The event name does not fit the 1-byte length prefix.
    #[error("event name too long ({len} bytes, max {max})")]
    EventNameTooLong { len: usize, max: usize },

    /// The event name on the wire is not valid UTF-8.
    #[error("event name is not valid UTF-8")]
    InvalidEventName,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection cleanly between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer closed the connection part-way through a frame.
    #[error("unexpected end of stream ({buffered} bytes of an incomplete frame)")]
    UnexpectedEof { buffered: usize },
}

impl FrameError {
    /// True when the error was raised before any bytes reached the wire,
    /// leaving the connection usable.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FrameError::EventNameTooLong { .. } | FrameError::PayloadTooLarge { .. }
        )
    }

    /// True for read/write timeouts configured on the socket.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
