//! Race Control broadcasting protocol
//!
//! Frame codec for the simulator's UDP broadcasting interface (protocol v4).

pub mod codec;
pub mod error;
pub mod reader;

pub use codec::{decode, Command, InboundMessage, RegistrationResult};
pub use error::CodecError;
