//! Inbound frame handling
//!
//! Applies decoded frames to the session model and publishes the resulting
//! events. Model writes finish (and the write lock is released) before any
//! event for that frame is published, so listeners always read a complete
//! state.

use crate::client::CommandSender;
use crate::state::ModelWriter;
use rc_core::model::{CarId, PacketKind, SessionId, SessionInfo};
use rc_core::{Event, EventBus};
use rc_protocol::{decode, CodecError, Command, InboundMessage};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Minimum spacing of entry list requests triggered by unknown cars
const ENTRY_LIST_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Per-connection frame handler and sole writer of the session model
pub struct SessionState {
    model: ModelWriter,
    bus: EventBus,
    commands: CommandSender,
    session_id: Option<SessionId>,
    track_locked: bool,
    last_entry_list_request: Option<Instant>,
}

impl SessionState {
    pub fn new(model: ModelWriter, bus: EventBus, commands: CommandSender) -> Self {
        Self {
            model,
            bus,
            commands,
            session_id: None,
            track_locked: false,
            last_entry_list_request: None,
        }
    }

    /// Current session, `None` before the first realtime update
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Decode and handle one datagram.
    ///
    /// Malformed frames are logged and dropped; nothing is published for them.
    pub fn process_datagram(&mut self, data: &[u8]) -> Result<PacketKind, CodecError> {
        match decode(data) {
            Ok(message) => {
                let kind = message.kind();
                self.handle(message);
                Ok(kind)
            }
            Err(e) => {
                warn!(error = %e, len = data.len(), "Dropping malformed frame");
                Err(e)
            }
        }
    }

    /// Apply one decoded frame and publish its events
    pub fn handle(&mut self, message: InboundMessage) {
        let kind = message.kind();
        let events = match message {
            InboundMessage::RegistrationResult(result) => {
                debug!(
                    connection_id = result.connection_id,
                    "Ignoring registration result on open connection"
                );
                Vec::new()
            }
            InboundMessage::RealtimeUpdate(info) => self.on_realtime_update(info),
            InboundMessage::RealtimeCarUpdate(realtime) => {
                let car_id = realtime.car_id;
                let known = self.model.write().set_realtime(realtime);
                if !known {
                    self.request_entry_list(car_id);
                }
                Vec::new()
            }
            InboundMessage::EntryList { car_ids, .. } => {
                let removed = self.model.write().retain_cars(&car_ids);
                removed
                    .into_iter()
                    .inspect(|car| info!(car = %car.car_number_string(), "Car left the session"))
                    .map(Event::CarDisconnected)
                    .collect()
            }
            InboundMessage::EntryListCar(car) => {
                let car_id = car.car_id;
                let mut model = self.model.write();
                if model.upsert_car(car) {
                    model
                        .car(car_id)
                        .cloned()
                        .map(Event::CarConnected)
                        .into_iter()
                        .collect()
                } else {
                    Vec::new()
                }
            }
            InboundMessage::TrackData { track, .. } => {
                if self.track_locked {
                    debug!(track = %track.track_name, "Track data already set for this session");
                    Vec::new()
                } else {
                    info!(track = %track.track_name, meters = track.track_meters, "Track data received");
                    self.model.write().set_track_info(track.clone());
                    self.track_locked = true;
                    vec![Event::TrackData(track)]
                }
            }
            InboundMessage::BroadcastingEvent(event) => vec![Event::BroadcastingEvent(event)],
        };

        for event in events {
            self.bus.publish(event);
        }
        self.bus.publish(Event::AfterPacketReceived(kind));
    }

    fn on_realtime_update(&mut self, info: SessionInfo) -> Vec<Event> {
        let change = match self.session_id {
            None => Some((SessionId::first(&info), true)),
            Some(current) if current.is_changed_by(&info) => Some((current.next(&info), false)),
            Some(_) => None,
        };

        let mut events = Vec::with_capacity(2);
        {
            let mut model = self.model.write();
            model.set_session_info(info.clone());
            if let Some((session_id, _)) = change {
                model.set_session_id(session_id);
            }
        }

        if let Some((session_id, initialisation)) = change {
            info!(session = %session_id, initialisation, "Session changed");
            self.session_id = Some(session_id);
            if !initialisation {
                self.track_locked = false;
            }
            events.push(Event::SessionChanged {
                session_id,
                info: info.clone(),
                initialisation,
            });
        }
        events.push(Event::RealtimeUpdate(info));
        events
    }

    fn request_entry_list(&mut self, car_id: CarId) {
        let due = self
            .last_entry_list_request
            .map_or(true, |last| last.elapsed() >= ENTRY_LIST_REQUEST_INTERVAL);
        if due {
            debug!(car_id, "Unknown car, requesting entry list");
            self.commands.send(Command::RequestEntryList);
            self.last_entry_list_request = Some(Instant::now());
        }
    }
}
