//! Shared helpers: frame builders and an event recorder

#![allow(dead_code)]

use rc_core::model::{CarId, INVALID_TIME_MS};
use rc_core::{listener_fn, Event, EventBus};
use rc_protocol::codec::*;
use rc_protocol::reader::PacketWriter;
use std::sync::{Arc, Mutex};

pub const RACE: u8 = 10;
pub const QUALIFYING: u8 = 4;
pub const ACCIDENT: u8 = 4;

/// Collects every event published on a bus
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();
        let events = recorder.events.clone();
        bus.register(listener_fn(move |event: &Event, _: &mut rc_core::Publisher| {
            events.lock().unwrap().push(event.clone());
        }));
        recorder
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(Event::name).collect()
    }

    pub fn contacts(&self) -> Vec<rc_core::ContactInfo> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Contact(contact) => Some(contact),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

fn empty_lap(writer: PacketWriter) -> PacketWriter {
    writer
        .i32(INVALID_TIME_MS)
        .u16(0)
        .u16(0)
        .u8(0)
        .u8(0)
        .u8(0)
        .u8(0)
        .u8(0)
}

pub fn registration_result(connection_id: i32, success: bool, message: &str) -> Vec<u8> {
    PacketWriter::new(MSG_REGISTRATION_RESULT)
        .i32(connection_id)
        .u8(u8::from(success))
        .u8(1) // writable
        .string(message)
        .unwrap()
        .finish()
}

pub fn realtime_update(session_type: u8, session_index: u16, session_time_ms: f32) -> Vec<u8> {
    let writer = PacketWriter::new(MSG_REALTIME_UPDATE)
        .u16(1)
        .u16(session_index)
        .u8(session_type)
        .u8(5)
        .f32(session_time_ms)
        .f32(1_800_000.0)
        .i32(0)
        .string("Drivable")
        .unwrap()
        .string("Chase")
        .unwrap()
        .string("Basic HUD")
        .unwrap()
        .u8(0) // no replay
        .f32(43_200_000.0)
        .u8(22)
        .u8(30)
        .u8(0)
        .u8(0)
        .u8(0);
    empty_lap(writer).finish()
}

pub fn realtime_car_update(car_id: CarId, spline_position: f32) -> Vec<u8> {
    let writer = PacketWriter::new(MSG_REALTIME_CAR_UPDATE)
        .u16(car_id)
        .u16(0)
        .u8(1)
        .u8(5)
        .f32(0.0)
        .f32(0.0)
        .f32(0.0)
        .u8(1)
        .u16(180)
        .u16(1)
        .u16(1)
        .u16(1)
        .f32(spline_position)
        .u16(3)
        .i32(0);
    empty_lap(empty_lap(empty_lap(writer))).finish()
}

pub fn entry_list(connection_id: i32, car_ids: &[CarId]) -> Vec<u8> {
    car_ids
        .iter()
        .fold(
            PacketWriter::new(MSG_ENTRY_LIST)
                .i32(connection_id)
                .u16(car_ids.len() as u16),
            |writer, id| writer.u16(*id),
        )
        .finish()
}

pub fn entry_list_car(car_id: CarId, car_number: i32) -> Vec<u8> {
    PacketWriter::new(MSG_ENTRY_LIST_CAR)
        .u16(car_id)
        .u8(0)
        .string("Team")
        .unwrap()
        .i32(car_number)
        .u8(0)
        .u8(0)
        .u16(0)
        .u8(1)
        .string("Test")
        .unwrap()
        .string("Driver")
        .unwrap()
        .string("TDR")
        .unwrap()
        .u8(0)
        .u16(0)
        .finish()
}

pub fn track_data(connection_id: i32, name: &str, track_meters: i32) -> Vec<u8> {
    PacketWriter::new(MSG_TRACK_DATA)
        .i32(connection_id)
        .string(name)
        .unwrap()
        .i32(1)
        .i32(track_meters)
        .u8(0)
        .u8(0)
        .finish()
}

pub fn broadcasting_event(kind: u8, time_ms: i32, car_id: i32) -> Vec<u8> {
    PacketWriter::new(MSG_BROADCASTING_EVENT)
        .u8(kind)
        .string("event")
        .unwrap()
        .i32(time_ms)
        .i32(car_id)
        .finish()
}
