//! Events published on the event bus

use crate::contact::ContactInfo;
use crate::model::{
    BroadcastingEvent, CarId, CarInfo, PacketKind, SessionId, SessionInfo, TrackInfo,
};

/// Everything the core tells the rest of the system.
///
/// Listeners match on this exhaustively; payloads are owned snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Handshake accepted
    ConnectionOpened {
        connection_id: i32,
        read_only: bool,
        update_interval_ms: u32,
    },
    /// Handshake rejected or timed out
    ConnectionFailed { reason: String },
    /// Connection shut down or lost
    ConnectionClosed,
    /// The session type or index changed, or the first session was seen
    SessionChanged {
        session_id: SessionId,
        info: SessionInfo,
        initialisation: bool,
    },
    RealtimeUpdate(SessionInfo),
    /// Published after every successfully handled frame
    AfterPacketReceived(PacketKind),
    CarConnected(CarInfo),
    CarDisconnected(CarInfo),
    TrackData(TrackInfo),
    BroadcastingEvent(BroadcastingEvent),
    /// A car was flagged yellow by danger detection
    YellowFlag { car_id: CarId },
    /// A committed incident
    Contact(ContactInfo),
}

impl Event {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Event::ConnectionOpened { .. } => "ConnectionOpened",
            Event::ConnectionFailed { .. } => "ConnectionFailed",
            Event::ConnectionClosed => "ConnectionClosed",
            Event::SessionChanged { .. } => "SessionChanged",
            Event::RealtimeUpdate(_) => "RealtimeUpdate",
            Event::AfterPacketReceived(_) => "AfterPacketReceived",
            Event::CarConnected(_) => "CarConnected",
            Event::CarDisconnected(_) => "CarDisconnected",
            Event::TrackData(_) => "TrackData",
            Event::BroadcastingEvent(_) => "BroadcastingEvent",
            Event::YellowFlag { .. } => "YellowFlag",
            Event::Contact(_) => "Contact",
        }
    }
}
