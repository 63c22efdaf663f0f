//! Session state model
//!
//! Authoritative snapshot of the session, track and cars as reconstructed
//! from the broadcasting feed. Only the protocol client writes to it;
//! everything else reads through a shared view.

use crate::model::{CarId, CarInfo, RealtimeCarInfo, SessionId, SessionInfo, TrackInfo};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct SessionModel {
    session_id: SessionId,
    session_info: SessionInfo,
    cars: BTreeMap<CarId, CarInfo>,
    track_info: Option<TrackInfo>,
}

impl SessionModel {
    pub fn new() -> Self {
        Self::default()
    }

    // === Read access ===

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn session_info(&self) -> &SessionInfo {
        &self.session_info
    }

    pub fn car(&self, car_id: CarId) -> Option<&CarInfo> {
        self.cars.get(&car_id)
    }

    /// Cars ordered by car id
    pub fn cars(&self) -> impl Iterator<Item = &CarInfo> {
        self.cars.values()
    }

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn contains_car(&self, car_id: CarId) -> bool {
        self.cars.contains_key(&car_id)
    }

    pub fn track_info(&self) -> Option<&TrackInfo> {
        self.track_info.as_ref()
    }

    /// Track length in meters, `None` until track data arrived
    pub fn track_meters(&self) -> Option<i32> {
        self.track_info.as_ref().map(|t| t.track_meters)
    }

    // === Write access ===

    pub fn set_session_id(&mut self, session_id: SessionId) {
        self.session_id = session_id;
    }

    pub fn set_session_info(&mut self, info: SessionInfo) {
        self.session_info = info;
    }

    /// Insert or replace a car's identity, keeping its realtime data.
    ///
    /// Returns `true` if the car was not known before.
    pub fn upsert_car(&mut self, car: CarInfo) -> bool {
        match self.cars.get_mut(&car.car_id) {
            Some(existing) => {
                *existing = existing.with_identity_of(&car);
                false
            }
            None => {
                self.cars.insert(car.car_id, car);
                true
            }
        }
    }

    /// Replace a known car's realtime data.
    ///
    /// Returns `false` if the car is unknown; the update is dropped.
    pub fn set_realtime(&mut self, realtime: RealtimeCarInfo) -> bool {
        match self.cars.get_mut(&realtime.car_id) {
            Some(car) => {
                car.realtime = realtime;
                true
            }
            None => false,
        }
    }

    /// Drop every car not in `keep`, returning the removed cars
    pub fn retain_cars(&mut self, keep: &[CarId]) -> Vec<CarInfo> {
        let removed: Vec<CarId> = self
            .cars
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        removed
            .into_iter()
            .filter_map(|id| self.cars.remove(&id))
            .collect()
    }

    pub fn set_track_info(&mut self, track: TrackInfo) {
        self.track_info = Some(track);
    }

    /// Forget everything, e.g. before a new connection
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
