/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// More unframed bytes were buffered than the configured limit allows.
    #[error("frame buffer overflow ({buffered} bytes buffered, max {max})")]
    BufferOverflow { buffered: usize, max: usize },

    /// A frame declared a length of zero, so it has no message kind.
    #[error("empty frame (length 0)")]
    EmptyFrame,

    /// The message kind byte is not one we know.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// The frame body is shorter than its message kind requires.
    #[error("truncated {kind} payload ({actual} bytes, expected {expected})")]
    Truncated {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A DRC level byte outside 0..=3.
    #[error("invalid DRC level {0}")]
    InvalidDrcLevel(u8),

    /// The sink accepted only part of a write.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink reported that it accepts no more bytes.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
