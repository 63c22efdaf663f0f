//! Contact detection
//!
//! Turns the simulator's accident notifications into incident records.
//! Notifications arriving close together are coalesced into one
//! [`ContactInfo`], which is published as `Event::Contact` once no further
//! car has joined it for a second of session time.
//!
//! Commit is checked after every received packet, never on a timer. Two
//! clocks are consulted: the session clock, and wall-clock time since a car
//! last joined the incident. The latter covers a paused or frozen session,
//! where session time stops advancing but the simulator keeps sending. A
//! silent connection still holds the incident until the next packet, a
//! session change or the connection closing.
//!
//! Alongside, a short history of close proximity between cars is kept so a
//! yellow flag can be put into context ("who was near this car just now").

use crate::replay_offset::ReplayTimeLookup;
use crate::state::{AppState, ModelView};
use rc_core::model::{BroadcastingEvent, BroadcastingEventType, CarId, CarInfo};
use rc_core::units::{format_delta, format_duration, Meters};
use rc_core::{ContactInfo, Event, EventListener, Publisher};
use std::collections::{BTreeMap, VecDeque};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The simulator reports an accident about this long after the contact
pub const ACCIDENT_REPORT_LATENCY_MS: i32 = 5000;

/// Accidents at most this far apart belong to the same incident
pub const CONTACT_WINDOW_MS: i32 = 1000;

/// Wall-clock time after which an incident no car has joined is committed
pub const IDLE_COMMIT: Duration = Duration::from_millis(1000);

/// Cars closer than this along the track are "meeting"
pub const MEETING_DISTANCE_M: f32 = 2.0;

/// How far back the meeting history reaches
pub const MEETING_LOOKBACK_MS: u32 = 3000;

/// Pairs of cars within [`MEETING_DISTANCE_M`] at one realtime update.
///
/// Distances are signed: positive when the first car is ahead of the other
/// along the spline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingSnapshot {
    meetings: BTreeMap<CarId, BTreeMap<CarId, Meters>>,
}

impl MeetingSnapshot {
    /// Record every ordered pair of distinct cars closer than the threshold
    pub fn compute<'a>(cars: impl IntoIterator<Item = &'a CarInfo>, track_meters: i32) -> Self {
        let positions: Vec<(CarId, f32)> = cars
            .into_iter()
            .map(|car| (car.car_id, car.realtime.spline_position))
            .collect();
        let track_meters = track_meters as f32;

        let mut meetings: BTreeMap<CarId, BTreeMap<CarId, Meters>> = BTreeMap::new();
        for &(car_id, pos) in &positions {
            for &(other_id, other_pos) in &positions {
                if car_id == other_id {
                    continue;
                }
                let distance = (pos - other_pos) * track_meters;
                if distance.abs() < MEETING_DISTANCE_M {
                    meetings
                        .entry(car_id)
                        .or_default()
                        .insert(other_id, Meters(distance));
                }
            }
        }
        Self { meetings }
    }

    pub fn distance(&self, car_id: CarId, other_id: CarId) -> Option<Meters> {
        self.meetings.get(&car_id)?.get(&other_id).copied()
    }

    /// Cars near `car_id`, ordered by id
    pub fn neighbours(&self, car_id: CarId) -> impl Iterator<Item = (CarId, Meters)> + '_ {
        self.meetings
            .get(&car_id)
            .into_iter()
            .flat_map(|others| others.iter().map(|(id, distance)| (*id, *distance)))
    }

    /// Number of recorded ordered pairs
    pub fn pair_count(&self) -> usize {
        self.meetings.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty()
    }
}

/// The closest another car came to a given car within the history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    pub other: CarId,
    pub distance: Meters,
    /// Negative offset from now, in ms
    pub time_ago_ms: i32,
}

/// Bounded history of meeting snapshots, oldest first
#[derive(Debug, Clone)]
pub struct MeetingHistory {
    snapshots: VecDeque<MeetingSnapshot>,
    capacity: usize,
    update_interval_ms: u32,
}

impl MeetingHistory {
    pub fn new(update_interval_ms: u32) -> Self {
        let update_interval_ms = update_interval_ms.max(1);
        let capacity = Self::capacity_for(update_interval_ms);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
            update_interval_ms,
        }
    }

    /// Snapshots covering [`MEETING_LOOKBACK_MS`], never less than one
    pub fn capacity_for(update_interval_ms: u32) -> usize {
        (MEETING_LOOKBACK_MS / update_interval_ms.max(1)).max(1) as usize
    }

    /// Append a snapshot, evicting the oldest when full
    pub fn push(&mut self, snapshot: MeetingSnapshot) {
        while self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn update_interval_ms(&self) -> u32 {
        self.update_interval_ms
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeetingSnapshot> {
        self.snapshots.iter()
    }

    pub fn latest(&self) -> Option<&MeetingSnapshot> {
        self.snapshots.back()
    }

    /// Drop all snapshots and size the history for a new update interval
    pub fn reset(&mut self, update_interval_ms: u32) {
        *self = Self::new(update_interval_ms);
    }

    /// For every car that met `car_id`, its smallest absolute distance and
    /// when that was. Ties keep the older snapshot. Ordered by car id.
    pub fn closest_approaches(&self, car_id: CarId) -> Vec<ClosestApproach> {
        let interval = i32::try_from(self.update_interval_ms).unwrap_or(i32::MAX);
        let count = i32::try_from(self.snapshots.len()).unwrap_or(i32::MAX);
        let mut closest: BTreeMap<CarId, ClosestApproach> = BTreeMap::new();

        for (index, snapshot) in self.snapshots.iter().enumerate() {
            let age = count.saturating_sub(index as i32);
            let time_ago_ms = age.saturating_mul(interval).saturating_neg();
            for (other, distance) in snapshot.neighbours(car_id) {
                let closer = closest
                    .get(&other)
                    .map_or(true, |best| distance.abs().0 < best.distance.abs().0);
                if closer {
                    closest.insert(
                        other,
                        ClosestApproach {
                            other,
                            distance,
                            time_ago_ms,
                        },
                    );
                }
            }
        }
        closest.into_values().collect()
    }
}

/// Event listener that stages and commits incidents
pub struct ContactDetector {
    model: ModelView,
    replay: Arc<dyn ReplayTimeLookup>,
    history: MeetingHistory,
    staged: Option<ContactInfo>,
    idle_commit: Duration,
}

impl ContactDetector {
    pub fn new(model: ModelView, replay: Arc<dyn ReplayTimeLookup>, update_interval_ms: u32) -> Self {
        Self {
            model,
            replay,
            history: MeetingHistory::new(update_interval_ms),
            staged: None,
            idle_commit: IDLE_COMMIT,
        }
    }

    /// Override the wall-clock delay after which an idle incident is committed
    #[must_use]
    pub fn with_idle_commit(mut self, idle_commit: Duration) -> Self {
        self.idle_commit = idle_commit;
        self
    }

    /// Detector wired to the application's model and replay offset
    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.model.clone(),
            Arc::new(state.replay_offset.clone()),
            state.config.update_interval(),
        )
    }

    /// Incident waiting for more cars, if any
    pub fn staged(&self) -> Option<&ContactInfo> {
        self.staged.as_ref()
    }

    pub fn history(&self) -> &MeetingHistory {
        &self.history
    }

    fn on_accident(&mut self, event: &BroadcastingEvent, publisher: &mut Publisher) {
        let Some(car_id) = event.car() else {
            warn!(car_id = event.car_id, "Accident without a valid car id");
            return;
        };

        let (session_time, session_id, car) = {
            let model = self.model.read();
            let car = model.car(car_id).cloned().unwrap_or_else(|| {
                warn!(car_id, "Accident for a car missing from the entry list");
                CarInfo::placeholder(car_id)
            });
            (
                corrected_time(model.session_info().session_time_ms()),
                model.session_id(),
                car,
            )
        };

        let replay_time = match self.replay.replay_time(session_time) {
            Ok(replay_time) => Some(replay_time),
            Err(e) => {
                debug!(session_time, "{}", e);
                None
            }
        };

        info!(
            "Contact: {}\t{}\t{}",
            car.car_number_string(),
            format_duration(session_time),
            replay_time.map_or_else(|| "--".to_string(), format_duration)
        );

        self.staged = match self.staged.take() {
            Some(staged)
                if gap_ms(session_time, staged.session_latest_time()).abs() <= window() =>
            {
                Some(staged.with_car(session_time, car))
            }
            Some(staged) => {
                commit(staged, publisher);
                Some(ContactInfo::new(session_time, replay_time, car, session_id))
            }
            None => Some(ContactInfo::new(session_time, replay_time, car, session_id)),
        };
    }

    fn commit_if_stale(&mut self, publisher: &mut Publisher) {
        let Some(staged) = self.staged.as_ref() else {
            return;
        };
        let now = corrected_time(self.model.read().session_info().session_time_ms());
        let session_elapsed = gap_ms(now, staged.session_latest_time()) > window();
        let idle = (Utc::now() - staged.system_timestamp())
            .to_std()
            .unwrap_or_default()
            >= self.idle_commit;
        if session_elapsed || idle {
            self.flush(publisher);
        }
    }

    fn flush(&mut self, publisher: &mut Publisher) {
        if let Some(staged) = self.staged.take() {
            commit(staged, publisher);
        }
    }

    fn record_meetings(&mut self) {
        let snapshot = {
            let model = self.model.read();
            match model.track_meters() {
                Some(track_meters) if track_meters > 0 => {
                    MeetingSnapshot::compute(model.cars(), track_meters)
                }
                _ => return,
            }
        };
        self.history.push(snapshot);
    }

    fn on_yellow_flag(&self, car_id: CarId) {
        let approaches = self.history.closest_approaches(car_id);
        let model = self.model.read();
        let car_number = model
            .car(car_id)
            .map_or_else(|| format!("#?{car_id}"), CarInfo::car_number_string);
        info!(car = %car_number, nearby = approaches.len(), "Yellow flag");
        for approach in approaches {
            let other = model
                .car(approach.other)
                .map_or_else(|| format!("#?{}", approach.other), CarInfo::car_number_string);
            info!(
                "\t{}\t{:.1}m\t{}s",
                other,
                approach.distance.0,
                format_delta(approach.time_ago_ms)
            );
        }
    }
}

/// Session time of the contact behind an accident reported at `session_time`
fn corrected_time(session_time: i32) -> i32 {
    session_time.saturating_sub(ACCIDENT_REPORT_LATENCY_MS)
}

/// Signed distance between two session times, wide enough for any pair
fn gap_ms(a: i32, b: i32) -> i64 {
    i64::from(a) - i64::from(b)
}

fn window() -> i64 {
    i64::from(CONTACT_WINDOW_MS)
}

fn commit(contact: ContactInfo, publisher: &mut Publisher) {
    info!(
        session = %contact.session_id(),
        cars = ?contact.car_ids(),
        from = %format_duration(contact.session_earliest_time()),
        to = %format_duration(contact.session_latest_time()),
        "Contact committed"
    );
    publisher.publish(Event::Contact(contact));
}

impl EventListener for ContactDetector {
    fn on_event(&mut self, event: &Event, publisher: &mut Publisher) {
        match event {
            Event::ConnectionOpened {
                update_interval_ms, ..
            } => {
                self.staged = None;
                self.history.reset(*update_interval_ms);
            }
            Event::ConnectionClosed => self.flush(publisher),
            Event::SessionChanged {
                initialisation: false,
                ..
            } => self.flush(publisher),
            Event::RealtimeUpdate(_) => self.record_meetings(),
            Event::BroadcastingEvent(broadcast)
                if broadcast.kind == BroadcastingEventType::Accident =>
            {
                self.on_accident(broadcast, publisher);
            }
            Event::AfterPacketReceived(_) => self.commit_if_stale(publisher),
            Event::YellowFlag { car_id } => self.on_yellow_flag(*car_id),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_core::model::RealtimeCarInfo;

    fn car_at(car_id: CarId, spline_position: f32) -> CarInfo {
        CarInfo {
            realtime: RealtimeCarInfo {
                car_id,
                spline_position,
                ..RealtimeCarInfo::default()
            },
            ..CarInfo::placeholder(car_id)
        }
    }

    #[test]
    fn test_snapshot_records_both_directions() {
        let cars = [car_at(1, 0.5), car_at(2, 0.5003), car_at(3, 0.9)];
        let snapshot = MeetingSnapshot::compute(&cars, 5000);

        assert_eq!(snapshot.pair_count(), 2);
        let ahead = snapshot.distance(2, 1).unwrap();
        let behind = snapshot.distance(1, 2).unwrap();
        assert!((ahead.0 - 1.5).abs() < 0.01);
        assert!((behind.0 + 1.5).abs() < 0.01);
        assert!(snapshot.distance(1, 3).is_none());
    }

    #[test]
    fn test_history_capacity() {
        assert_eq!(MeetingHistory::capacity_for(200), 15);
        assert_eq!(MeetingHistory::capacity_for(250), 12);
        assert_eq!(MeetingHistory::capacity_for(5000), 1);
        assert_eq!(MeetingHistory::capacity_for(0), 3000);
    }

    #[test]
    fn test_closest_approach_prefers_smaller_distance() {
        let mut history = MeetingHistory::new(1000);
        history.push(MeetingSnapshot::compute(&[car_at(1, 0.0), car_at(2, 0.0003)], 5000));
        history.push(MeetingSnapshot::compute(&[car_at(1, 0.0), car_at(2, 0.0001)], 5000));
        history.push(MeetingSnapshot::compute(&[car_at(1, 0.0), car_at(2, 0.5)], 5000));

        let approaches = history.closest_approaches(1);
        assert_eq!(approaches.len(), 1);
        assert_eq!(approaches[0].other, 2);
        assert_eq!(approaches[0].time_ago_ms, -2000);
        assert!((approaches[0].distance.0 + 0.5).abs() < 0.01);
    }

    #[test]
    fn test_closest_approach_with_huge_interval() {
        let mut history = MeetingHistory::new(u32::MAX);
        history.push(MeetingSnapshot::compute(&[car_at(1, 0.0), car_at(2, 0.0001)], 5000));

        let approaches = history.closest_approaches(1);
        assert_eq!(approaches.len(), 1);
        assert_eq!(approaches[0].time_ago_ms, -i32::MAX);
    }

    #[test]
    fn test_corrected_time_saturates() {
        assert_eq!(corrected_time(i32::MIN), i32::MIN);
        assert_eq!(corrected_time(6000), 1000);
        assert_eq!(gap_ms(i32::MAX, i32::MIN), i64::from(u32::MAX));
    }
}
