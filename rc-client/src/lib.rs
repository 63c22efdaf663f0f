//! Race Control Client Library
//!
//! Connects to the simulator's broadcasting interface, keeps the session
//! model current and detects contacts between cars. Exposed as a library for
//! integration testing and for front-ends built on the event bus.

pub mod client;
pub mod config;
pub mod contact;
pub mod error;
pub mod replay_offset;
pub mod session;
pub mod state;

pub use client::{BroadcastClient, CommandSender, ConnectionState};
pub use config::ClientConfig;
pub use contact::ContactDetector;
pub use error::ClientError;
pub use replay_offset::{ReplayOffset, ReplayOffsetUnavailable, ReplayTimeLookup};
pub use state::{AppState, ModelView, ModelWriter};
