//! Broadcasting protocol v4 frame codec
//!
//! `decode` turns one inbound datagram into an [`InboundMessage`];
//! `Command::encode` builds outbound requests. The protocol is asymmetric,
//! so there is no encoder for inbound frames. Decoding is pure.

use crate::error::{CodecError, Result};
use crate::reader::{PacketReader, PacketWriter};
use rc_core::model::{
    BroadcastingEvent, BroadcastingEventType, CameraSet, CarId, CarInfo, CarLocation, DriverInfo,
    LapInfo, PacketKind, RealtimeCarInfo, SessionInfo, SessionPhase, SessionType, TrackInfo,
};

pub const PROTOCOL_VERSION: u8 = 4;

// Outbound message types
pub const REGISTER_COMMAND_APPLICATION: u8 = 1;
pub const UNREGISTER_COMMAND_APPLICATION: u8 = 9;
pub const REQUEST_ENTRY_LIST: u8 = 10;
pub const REQUEST_TRACK_DATA: u8 = 11;
pub const CHANGE_HUD_PAGE: u8 = 49;
pub const CHANGE_FOCUS: u8 = 50;
pub const INSTANT_REPLAY_REQUEST: u8 = 51;

// Inbound message types
pub const MSG_REGISTRATION_RESULT: u8 = 1;
pub const MSG_REALTIME_UPDATE: u8 = 2;
pub const MSG_REALTIME_CAR_UPDATE: u8 = 3;
pub const MSG_ENTRY_LIST: u8 = 4;
pub const MSG_TRACK_DATA: u8 = 5;
pub const MSG_ENTRY_LIST_CAR: u8 = 6;
pub const MSG_BROADCASTING_EVENT: u8 = 7;

/// Largest datagram the simulator sends
pub const MAX_PACKET_SIZE: usize = 32 * 1024;

/// Answer to a registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResult {
    pub connection_id: i32,
    pub success: bool,
    pub read_only: bool,
    /// Empty on success
    pub error_message: String,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    RegistrationResult(RegistrationResult),
    RealtimeUpdate(SessionInfo),
    RealtimeCarUpdate(RealtimeCarInfo),
    EntryList {
        connection_id: i32,
        car_ids: Vec<CarId>,
    },
    TrackData {
        connection_id: i32,
        track: TrackInfo,
    },
    /// Identity record; `realtime` is left at its default
    EntryListCar(CarInfo),
    BroadcastingEvent(BroadcastingEvent),
}

impl InboundMessage {
    pub fn kind(&self) -> PacketKind {
        match self {
            InboundMessage::RegistrationResult(_) => PacketKind::RegistrationResult,
            InboundMessage::RealtimeUpdate(_) => PacketKind::RealtimeUpdate,
            InboundMessage::RealtimeCarUpdate(_) => PacketKind::RealtimeCarUpdate,
            InboundMessage::EntryList { .. } => PacketKind::EntryList,
            InboundMessage::TrackData { .. } => PacketKind::TrackData,
            InboundMessage::EntryListCar(_) => PacketKind::EntryListCar,
            InboundMessage::BroadcastingEvent(_) => PacketKind::BroadcastingEvent,
        }
    }
}

/// Decode one inbound datagram
pub fn decode(data: &[u8]) -> Result<InboundMessage> {
    let mut reader = PacketReader::new(data);
    let message_type = reader.read_u8().map_err(|_| CodecError::Empty)?;

    let message = match message_type {
        MSG_REGISTRATION_RESULT => {
            InboundMessage::RegistrationResult(read_registration_result(&mut reader)?)
        }
        MSG_REALTIME_UPDATE => InboundMessage::RealtimeUpdate(read_realtime_update(&mut reader)?),
        MSG_REALTIME_CAR_UPDATE => {
            InboundMessage::RealtimeCarUpdate(read_realtime_car_update(&mut reader)?)
        }
        MSG_ENTRY_LIST => {
            let connection_id = reader.read_i32()?;
            let count = reader.read_u16()?;
            let car_ids = (0..count)
                .map(|_| reader.read_u16())
                .collect::<Result<Vec<_>>>()?;
            InboundMessage::EntryList {
                connection_id,
                car_ids,
            }
        }
        MSG_TRACK_DATA => {
            let connection_id = reader.read_i32()?;
            InboundMessage::TrackData {
                connection_id,
                track: read_track_data(&mut reader)?,
            }
        }
        MSG_ENTRY_LIST_CAR => InboundMessage::EntryListCar(read_entry_list_car(&mut reader)?),
        MSG_BROADCASTING_EVENT => InboundMessage::BroadcastingEvent(BroadcastingEvent {
            kind: BroadcastingEventType::from_raw(reader.read_u8()?),
            message: reader.read_string()?,
            time_ms: reader.read_i32()?,
            car_id: reader.read_i32()?,
        }),
        other => return Err(CodecError::UnknownMessageType(other)),
    };

    Ok(message)
}

fn read_registration_result(reader: &mut PacketReader<'_>) -> Result<RegistrationResult> {
    Ok(RegistrationResult {
        connection_id: reader.read_i32()?,
        success: reader.read_bool()?,
        // Byte == 0 means read-only (inverted from the bool convention)
        read_only: reader.read_u8()? == 0,
        error_message: reader.read_string()?,
    })
}

fn read_realtime_update(reader: &mut PacketReader<'_>) -> Result<SessionInfo> {
    let event_index = reader.read_u16()?;
    let session_index = reader.read_u16()?;
    let session_type = SessionType::from_raw(reader.read_u8()?);
    let phase = SessionPhase::from_raw(reader.read_u8()?);
    let session_time = reader.read_f32()?;
    let session_end_time = reader.read_f32()?;
    let focused_car_index = reader.read_i32()?;
    let active_camera_set = reader.read_string()?;
    let active_camera = reader.read_string()?;
    let current_hud_page = reader.read_string()?;

    let is_replay_playing = reader.read_bool()?;
    let (replay_session_time, replay_remaining_time) = if is_replay_playing {
        (reader.read_f32()?, reader.read_f32()?)
    } else {
        (0.0, 0.0)
    };

    Ok(SessionInfo {
        event_index,
        session_index,
        session_type,
        phase,
        session_time,
        session_end_time,
        focused_car_index,
        active_camera_set,
        active_camera,
        current_hud_page,
        is_replay_playing,
        replay_session_time,
        replay_remaining_time,
        time_of_day: reader.read_f32()?,
        ambient_temp: reader.read_u8()?,
        track_temp: reader.read_u8()?,
        clouds: reader.read_u8()?,
        rain_level: reader.read_u8()?,
        wetness: reader.read_u8()?,
        best_session_lap: read_lap(reader)?,
    })
}

fn read_realtime_car_update(reader: &mut PacketReader<'_>) -> Result<RealtimeCarInfo> {
    Ok(RealtimeCarInfo {
        car_id: reader.read_u16()?,
        driver_index: reader.read_u16()?,
        driver_count: reader.read_u8()?,
        // Wire value is offset by two: 0 = reverse, 1 = neutral
        gear: (i16::from(reader.read_u8()?) - 2) as i8,
        world_pos_x: reader.read_f32()?,
        world_pos_y: reader.read_f32()?,
        yaw: reader.read_f32()?,
        location: CarLocation::from_raw(reader.read_u8()?),
        kmh: reader.read_u16()?,
        position: reader.read_u16()?,
        cup_position: reader.read_u16()?,
        track_position: reader.read_u16()?,
        spline_position: reader.read_f32()?,
        laps: reader.read_u16()?,
        delta: reader.read_i32()?,
        best_session_lap: read_lap(reader)?,
        last_lap: read_lap(reader)?,
        current_lap: read_lap(reader)?,
    })
}

fn read_lap(reader: &mut PacketReader<'_>) -> Result<LapInfo> {
    let lap_time_ms = reader.read_i32()?;
    let car_id = reader.read_u16()?;
    let driver_index = reader.read_u16()?;
    let split_count = reader.read_u8()?;
    let splits = (0..split_count)
        .map(|_| reader.read_i32())
        .collect::<Result<Vec<_>>>()?;

    Ok(LapInfo {
        lap_time_ms,
        car_id,
        driver_index,
        splits,
        is_invalid: reader.read_bool()?,
        is_valid_for_best: reader.read_bool()?,
        is_outlap: reader.read_bool()?,
        is_inlap: reader.read_bool()?,
    })
}

fn read_track_data(reader: &mut PacketReader<'_>) -> Result<TrackInfo> {
    let track_name = reader.read_string()?;
    let track_id = reader.read_i32()?;
    let track_meters = reader.read_i32()?;

    let camera_set_count = reader.read_u8()?;
    let mut camera_sets = Vec::with_capacity(usize::from(camera_set_count));
    for _ in 0..camera_set_count {
        let name = reader.read_string()?;
        let camera_count = reader.read_u8()?;
        let cameras = (0..camera_count)
            .map(|_| reader.read_string())
            .collect::<Result<Vec<_>>>()?;
        camera_sets.push(CameraSet { name, cameras });
    }

    let hud_page_count = reader.read_u8()?;
    let hud_pages = (0..hud_page_count)
        .map(|_| reader.read_string())
        .collect::<Result<Vec<_>>>()?;

    Ok(TrackInfo {
        track_name,
        track_id,
        track_meters,
        camera_sets,
        hud_pages,
    })
}

fn read_entry_list_car(reader: &mut PacketReader<'_>) -> Result<CarInfo> {
    let car_id = reader.read_u16()?;
    let car_model_type = reader.read_u8()?;
    let team_name = reader.read_string()?;
    let car_number = reader.read_i32()?;
    let cup_category = reader.read_u8()?;
    let current_driver_index = reader.read_u8()?;
    let nationality = reader.read_u16()?;

    let driver_count = reader.read_u8()?;
    let mut drivers = Vec::with_capacity(usize::from(driver_count));
    for _ in 0..driver_count {
        drivers.push(DriverInfo {
            first_name: reader.read_string()?,
            last_name: reader.read_string()?,
            short_name: reader.read_string()?,
            category: reader.read_u8()?,
            nationality: reader.read_u16()?,
        });
    }

    Ok(CarInfo {
        car_id,
        car_model_type,
        team_name,
        car_number,
        cup_category,
        current_driver_index,
        nationality,
        drivers,
        ..CarInfo::placeholder(car_id)
    })
}

/// Outbound request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register {
        display_name: String,
        connection_password: String,
        update_interval_ms: i32,
        command_password: String,
    },
    Unregister,
    RequestEntryList,
    RequestTrackData,
    /// Focus a car and/or switch camera; `None` leaves that part unchanged
    ChangeFocus {
        car_id: Option<CarId>,
        camera: Option<(String, String)>,
    },
    ChangeHudPage(String),
    /// Start an instant replay at `start_session_time` (ms)
    InstantReplay {
        start_session_time: f32,
        duration_ms: f32,
        focused_car: Option<CarId>,
        camera_set: String,
        camera: String,
    },
}

impl Command {
    /// Switch camera without changing focus
    pub fn change_camera(set: impl Into<String>, camera: impl Into<String>) -> Self {
        Command::ChangeFocus {
            car_id: None,
            camera: Some((set.into(), camera.into())),
        }
    }

    /// Focus a car without changing camera
    pub fn focus_car(car_id: CarId) -> Self {
        Command::ChangeFocus {
            car_id: Some(car_id),
            camera: None,
        }
    }

    /// Encode for the given connection. `Register` ignores `connection_id`.
    pub fn encode(&self, connection_id: i32) -> Result<Vec<u8>> {
        let bytes = match self {
            Command::Register {
                display_name,
                connection_password,
                update_interval_ms,
                command_password,
            } => {
                if *update_interval_ms <= 0 {
                    return Err(CodecError::InvalidUpdateInterval(*update_interval_ms));
                }
                PacketWriter::new(REGISTER_COMMAND_APPLICATION)
                    .u8(PROTOCOL_VERSION)
                    .string(display_name)?
                    .string(connection_password)?
                    .i32(*update_interval_ms)
                    .string(command_password)?
                    .finish()
            }
            Command::Unregister => PacketWriter::new(UNREGISTER_COMMAND_APPLICATION)
                .i32(connection_id)
                .finish(),
            Command::RequestEntryList => PacketWriter::new(REQUEST_ENTRY_LIST)
                .i32(connection_id)
                .finish(),
            Command::RequestTrackData => PacketWriter::new(REQUEST_TRACK_DATA)
                .i32(connection_id)
                .finish(),
            Command::ChangeFocus { car_id, camera } => {
                let mut writer = PacketWriter::new(CHANGE_FOCUS).i32(connection_id);
                writer = match car_id {
                    Some(car_id) => writer.u8(1).u16(*car_id),
                    None => writer.u8(0),
                };
                match camera {
                    Some((set, camera)) => writer.u8(1).string(set)?.string(camera)?.finish(),
                    None => writer.u8(0).finish(),
                }
            }
            Command::ChangeHudPage(page) => PacketWriter::new(CHANGE_HUD_PAGE)
                .i32(connection_id)
                .string(page)?
                .finish(),
            Command::InstantReplay {
                start_session_time,
                duration_ms,
                focused_car,
                camera_set,
                camera,
            } => PacketWriter::new(INSTANT_REPLAY_REQUEST)
                .i32(connection_id)
                .f32(*start_session_time)
                .f32(*duration_ms)
                .i32(focused_car.map(i32::from).unwrap_or(-1))
                .string(camera_set)?
                .string(camera)?
                .finish(),
        };
        Ok(bytes)
    }
}
