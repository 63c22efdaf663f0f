//! Session data model
//!
//! Types decoded from the broadcasting feed. Field names and raw encodings
//! follow the wire layout so a decoded frame can be compared field-by-field
//! against a capture; helper methods convert to typed units.

use crate::units::{Celsius, Meters, Percentage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Car index as assigned by the simulator. Unique within a session.
pub type CarId = u16;

/// Lap and split times of `i32::MAX` mean "no time set".
pub const INVALID_TIME_MS: i32 = i32::MAX;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum $name {
            #[default]
            $($variant,)+
            /// Value not known to this protocol version
            Unknown(u8),
        }

        impl $name {
            pub fn from_raw(raw: u8) -> Self {
                match raw {
                    $($value => $name::$variant,)+
                    other => $name::Unknown(other),
                }
            }

            pub fn raw(&self) -> u8 {
                match self {
                    $($name::$variant => $value,)+
                    $name::Unknown(other) => *other,
                }
            }
        }
    };
}

wire_enum! {
    /// Session type enumeration
    pub enum SessionType {
        Practice = 0,
        Qualifying = 4,
        Superpole = 9,
        Race = 10,
        Hotlap = 11,
        Hotstint = 12,
        HotlapSuperpole = 13,
        Replay = 14,
    }
}

wire_enum! {
    /// Phase of the running session
    pub enum SessionPhase {
        None = 0,
        Starting = 1,
        PreFormation = 2,
        FormationLap = 3,
        PreSession = 4,
        Session = 5,
        SessionOver = 6,
        PostSession = 7,
        ResultUi = 8,
    }
}

wire_enum! {
    /// Where a car currently is
    pub enum CarLocation {
        None = 0,
        Track = 1,
        Pitlane = 2,
        PitEntry = 3,
        PitExit = 4,
    }
}

wire_enum! {
    /// Kind of a simulator-pushed broadcasting event
    pub enum BroadcastingEventType {
        None = 0,
        GreenFlag = 1,
        SessionOver = 2,
        PenaltyCommMsg = 3,
        Accident = 4,
        LapCompleted = 5,
        BestSessionLap = 6,
        BestPersonalLap = 7,
    }
}

/// Kind of inbound frame, carried by `AfterPacketReceived`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    RegistrationResult,
    RealtimeUpdate,
    RealtimeCarUpdate,
    EntryList,
    TrackData,
    EntryListCar,
    BroadcastingEvent,
}

/// Lap information as attached to realtime updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapInfo {
    /// Lap time in ms, `INVALID_TIME_MS` when not set
    pub lap_time_ms: i32,
    pub car_id: CarId,
    pub driver_index: u16,
    /// Split times in ms, `INVALID_TIME_MS` when not set
    pub splits: Vec<i32>,
    pub is_invalid: bool,
    pub is_valid_for_best: bool,
    pub is_outlap: bool,
    pub is_inlap: bool,
}

impl LapInfo {
    /// Lap time, `None` if the lap has no time yet
    pub fn lap_time(&self) -> Option<i32> {
        (self.lap_time_ms != INVALID_TIME_MS).then_some(self.lap_time_ms)
    }
}

impl Default for LapInfo {
    fn default() -> Self {
        Self {
            lap_time_ms: INVALID_TIME_MS,
            car_id: 0,
            driver_index: 0,
            splits: Vec::new(),
            is_invalid: false,
            is_valid_for_best: false,
            is_outlap: false,
            is_inlap: false,
        }
    }
}

/// Session-wide state from a realtime update frame.
///
/// Replaced wholesale on every realtime update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub event_index: u16,
    pub session_index: u16,
    pub session_type: SessionType,
    pub phase: SessionPhase,
    /// Session time in ms
    pub session_time: f32,
    /// Remaining session time in ms
    pub session_end_time: f32,
    pub focused_car_index: i32,
    pub active_camera_set: String,
    pub active_camera: String,
    pub current_hud_page: String,
    pub is_replay_playing: bool,
    /// Only meaningful while `is_replay_playing`
    pub replay_session_time: f32,
    /// Only meaningful while `is_replay_playing`
    pub replay_remaining_time: f32,
    /// Time of day in ms
    pub time_of_day: f32,
    pub ambient_temp: u8,
    pub track_temp: u8,
    /// Tenths (0..=10)
    pub clouds: u8,
    /// Tenths (0..=10)
    pub rain_level: u8,
    /// Tenths (0..=10)
    pub wetness: u8,
    pub best_session_lap: LapInfo,
}

impl SessionInfo {
    /// Session time truncated to whole milliseconds
    pub fn session_time_ms(&self) -> i32 {
        self.session_time as i32
    }

    pub fn ambient_temp(&self) -> Celsius {
        Celsius(f32::from(self.ambient_temp))
    }

    pub fn track_temp(&self) -> Celsius {
        Celsius(f32::from(self.track_temp))
    }

    pub fn clouds(&self) -> Percentage {
        Percentage::from_tenths(self.clouds)
    }

    pub fn rain_level(&self) -> Percentage {
        Percentage::from_tenths(self.rain_level)
    }

    pub fn wetness(&self) -> Percentage {
        Percentage::from_tenths(self.wetness)
    }
}

/// Per-car telemetry from a realtime car update frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeCarInfo {
    pub car_id: CarId,
    pub driver_index: u16,
    pub driver_count: u8,
    /// -1 = reverse, 0 = neutral, 1+ = forward gears
    pub gear: i8,
    pub world_pos_x: f32,
    pub world_pos_y: f32,
    pub yaw: f32,
    pub location: CarLocation,
    pub kmh: u16,
    pub position: u16,
    pub cup_position: u16,
    pub track_position: u16,
    /// Fraction of the lap in [0, 1)
    pub spline_position: f32,
    pub laps: u16,
    /// Delta to best session lap in ms
    pub delta: i32,
    pub best_session_lap: LapInfo,
    pub last_lap: LapInfo,
    pub current_lap: LapInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub first_name: String,
    pub last_name: String,
    pub short_name: String,
    pub category: u8,
    pub nationality: u16,
}

/// Identity of a car plus its latest realtime data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarInfo {
    pub car_id: CarId,
    pub car_model_type: u8,
    pub team_name: String,
    pub car_number: i32,
    pub cup_category: u8,
    pub current_driver_index: u8,
    pub nationality: u16,
    pub drivers: Vec<DriverInfo>,
    pub realtime: RealtimeCarInfo,
}

impl CarInfo {
    /// A car known only by its id
    pub fn placeholder(car_id: CarId) -> Self {
        Self {
            car_id,
            realtime: RealtimeCarInfo {
                car_id,
                ..RealtimeCarInfo::default()
            },
            ..Self::default()
        }
    }

    /// The driver currently in the car
    pub fn driver(&self) -> Option<&DriverInfo> {
        self.drivers.get(usize::from(self.current_driver_index))
    }

    /// Race number formatted as `#7`
    pub fn car_number_string(&self) -> String {
        format!("#{}", self.car_number)
    }

    /// Replace identity fields, keeping the realtime data
    pub fn with_identity_of(&self, other: &CarInfo) -> CarInfo {
        CarInfo {
            realtime: self.realtime.clone(),
            ..other.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSet {
    pub name: String,
    pub cameras: Vec<String>,
}

/// Static per-session track data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_name: String,
    pub track_id: i32,
    pub track_meters: i32,
    pub camera_sets: Vec<CameraSet>,
    pub hud_pages: Vec<String>,
}

impl TrackInfo {
    pub fn length(&self) -> Meters {
        Meters(self.track_meters as f32)
    }
}

/// A simulator-pushed notification. Never stored in the session model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastingEvent {
    pub kind: BroadcastingEventType,
    pub message: String,
    /// Simulator clock in ms
    pub time_ms: i32,
    pub car_id: i32,
}

impl BroadcastingEvent {
    /// The car this event refers to, if the id fits a car index
    pub fn car(&self) -> Option<CarId> {
        CarId::try_from(self.car_id).ok()
    }
}

/// Identifies one session of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionId {
    pub session_type: SessionType,
    pub session_index: u16,
    /// Number of session changes seen on this connection before this one
    pub number: u32,
}

impl SessionId {
    /// Whether `info` belongs to a different session than this id
    pub fn is_changed_by(&self, info: &SessionInfo) -> bool {
        self.session_type != info.session_type || self.session_index != info.session_index
    }

    /// Id of the session following this one
    pub fn next(&self, info: &SessionInfo) -> SessionId {
        SessionId {
            session_type: info.session_type,
            session_index: info.session_index,
            number: self.number + 1,
        }
    }

    /// Id of the first session seen on a connection
    pub fn first(info: &SessionInfo) -> SessionId {
        SessionId {
            session_type: info.session_type,
            session_index: info.session_index,
            number: 0,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}#{}/{}",
            self.session_type, self.session_index, self.number
        )
    }
}
