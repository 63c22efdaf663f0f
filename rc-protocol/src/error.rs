//! Codec error types

/// Result type alias
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while decoding or encoding frames.
///
/// Every decode error means the frame is malformed and should be dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Zero-length datagram
    #[error("Malformed frame: empty datagram")]
    Empty,

    /// Leading type byte not part of the protocol
    #[error("Malformed frame: unknown message type {0}")]
    UnknownMessageType(u8),

    /// Payload shorter than its layout requires
    #[error("Malformed frame: need {needed} bytes at offset {offset}, frame has {len}")]
    Truncated {
        needed: usize,
        offset: usize,
        len: usize,
    },

    /// String field is not valid UTF-8
    #[error("Malformed frame: string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    /// String does not fit the u16 length prefix
    #[error("String exceeds u16 length prefix: {0} bytes")]
    StringTooLong(usize),

    /// Registration with a non-positive update interval
    #[error("Update interval must be positive, got {0}")]
    InvalidUpdateInterval(i32),
}
