//! Client error types

use rc_protocol::CodecError;
use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by the protocol client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The simulator refused the registration
    #[error("Handshake rejected: {message}")]
    HandshakeRejected { message: String },

    /// No registration result within the timeout
    #[error("No registration result within {0:?}")]
    HandshakeTimeout(Duration),

    /// `disconnect` was called before the handshake finished
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Socket-level failure
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// Outbound frame could not be encoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// `connect` called while not disconnected
    #[error("Client is already connected or connecting")]
    AlreadyConnected,

    /// Host did not resolve to any address
    #[error("Could not resolve {0}")]
    UnresolvedHost(String),
}
