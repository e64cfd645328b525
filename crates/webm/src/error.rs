//! Error types for WebM writing and probing.

use thiserror::Error;

/// Errors that can occur while writing or probing a WebM file.
#[derive(Error, Debug)]
pub enum WebmError {
    /// The writer API was used out of order.
    #[error("writer misuse: {0}")]
    Misuse(&'static str),

    /// The codec string has no WebM codec ID.
    #[error("codec `{0}` cannot be stored in WebM")]
    UnsupportedCodec(String),

    /// A value does not fit in an EBML variable-length integer.
    #[error("VINT overflow: {0} exceeds the maximum representable size")]
    VintOverflow(u64),

    /// A block is larger than the container can describe.
    #[error("block of {size} bytes at {timestamp_ms}ms is too large")]
    BlockTooLarge { size: usize, timestamp_ms: i64 },

    /// Structural problem found while probing.
    #[error("invalid WebM at offset {offset}: {message}")]
    Malformed { offset: usize, message: String },
}

impl WebmError {
    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        WebmError::Malformed {
            offset,
            message: message.into(),
        }
    }
}

/// Result type alias for WebM operations.
pub type Result<T> = std::result::Result<T, WebmError>;
