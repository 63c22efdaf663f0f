//! Aggregated incident record
//!
//! `ContactInfo` is a value: every change produces a new instance, so a
//! staged incident can be handed to listeners without locking.

use crate::model::{CarId, CarInfo, SessionId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactInfo {
    session_earliest_time: i32,
    session_latest_time: i32,
    replay_time: Option<i32>,
    session_id: SessionId,
    cars: Vec<CarInfo>,
    yellow_flagged_cars: Vec<CarId>,
    system_timestamp: DateTime<Utc>,
}

impl ContactInfo {
    /// Start an incident with its first involved car
    pub fn new(time: i32, replay_time: Option<i32>, car: CarInfo, session_id: SessionId) -> Self {
        Self {
            cars: vec![car],
            ..Self::empty(time, replay_time, session_id)
        }
    }

    /// Start an incident with no cars yet
    pub fn empty(time: i32, replay_time: Option<i32>, session_id: SessionId) -> Self {
        Self {
            session_earliest_time: time,
            session_latest_time: time,
            replay_time,
            session_id,
            cars: Vec::new(),
            yellow_flagged_cars: Vec::new(),
            system_timestamp: Utc::now(),
        }
    }

    /// Add a car involved at `session_time`
    #[must_use]
    pub fn with_car(&self, session_time: i32, car: CarInfo) -> Self {
        let mut cars = self.cars.clone();
        cars.push(car);
        Self {
            session_earliest_time: self.session_earliest_time.min(session_time),
            session_latest_time: self.session_latest_time.max(session_time),
            cars,
            system_timestamp: Utc::now(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_replay_time(&self, replay_time: Option<i32>) -> Self {
        Self {
            replay_time,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_yellow_flagged_cars(&self, yellow_flagged_cars: Vec<CarId>) -> Self {
        Self {
            yellow_flagged_cars,
            ..self.clone()
        }
    }

    pub fn session_earliest_time(&self) -> i32 {
        self.session_earliest_time
    }

    pub fn session_latest_time(&self) -> i32 {
        self.session_latest_time
    }

    /// Replay time of the incident, `None` while no replay offset is known
    pub fn replay_time(&self) -> Option<i32> {
        self.replay_time
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn cars(&self) -> &[CarInfo] {
        &self.cars
    }

    pub fn car_ids(&self) -> Vec<CarId> {
        self.cars.iter().map(|c| c.car_id).collect()
    }

    pub fn yellow_flagged_cars(&self) -> &[CarId] {
        &self.yellow_flagged_cars
    }

    /// Wall-clock time of the last involvement
    pub fn system_timestamp(&self) -> DateTime<Utc> {
        self.system_timestamp
    }
}
