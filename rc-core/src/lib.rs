//! Race Control Core Library
//!
//! This crate provides the session data model, the event types and the
//! process-wide event bus shared by the protocol client and its listeners.

pub mod bus;
pub mod contact;
pub mod event;
pub mod model;
pub mod session;
pub mod units;

pub use bus::{listener_fn, EventBus, EventListener, ListenerId, Publisher};
pub use contact::ContactInfo;
pub use event::Event;
pub use session::SessionModel;
