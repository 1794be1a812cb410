//! Check-in sessions and the snapshot clients report while travelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::{FamilyId, SessionId, UserId};

/// Location samples kept per session unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate, PartialEq)]
pub struct Coordinate {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub long: f64,
}

impl Coordinate {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }
}

/// Client-reported state submitted on start and on every update.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[validate(nested)]
    pub location: Coordinate,
    #[validate(nested)]
    pub destination: Coordinate,
    /// Battery charge as a fraction; `-1` when the device cannot tell.
    #[validate(range(min = -1.0, max = 1.0))]
    pub battery_level: f64,
    /// Arrival radius in meters.
    #[validate(range(exclusive_min = 0.0, max = 100_000.0))]
    pub radius: f64,
    /// The distance the client last received from the server, in meters.
    #[validate(range(min = 0.0))]
    pub distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200))]
    pub place_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub location: Coordinate,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckInSession {
    pub id: SessionId,
    pub family_id: FamilyId,
    pub host_id: UserId,
    pub location: Coordinate,
    pub destination: Coordinate,
    pub radius: f64,
    /// Last computed distance to the destination, in meters.
    pub distance: f64,
    /// Consecutive updates that moved away from the destination.
    pub stall_count: u32,
    pub battery_level: f64,
    pub place_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<LocationSample>,
}

impl CheckInSession {
    pub fn start(
        family_id: FamilyId,
        host_id: UserId,
        snapshot: &SessionSnapshot,
        distance: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            family_id,
            host_id,
            location: snapshot.location,
            destination: snapshot.destination,
            radius: snapshot.radius,
            distance,
            stall_count: 0,
            battery_level: snapshot.battery_level,
            place_name: snapshot.place_name.clone(),
            started_at: now,
            updated_at: now,
            history: vec![LocationSample {
                location: snapshot.location,
                recorded_at: now,
            }],
        }
    }

    /// Applies an accepted update. Only the host's own updates reach here.
    ///
    /// The arrival radius is fixed at start. History keeps the newest
    /// `history_limit` samples.
    pub fn apply_update(
        &mut self,
        snapshot: &SessionSnapshot,
        distance: f64,
        stall_count: u32,
        now: DateTime<Utc>,
        history_limit: usize,
    ) {
        self.location = snapshot.location;
        self.destination = snapshot.destination;
        self.battery_level = snapshot.battery_level;
        if snapshot.place_name.is_some() {
            self.place_name = snapshot.place_name.clone();
        }
        self.distance = distance;
        self.stall_count = stall_count;
        self.updated_at = now;
        self.history.push(LocationSample {
            location: snapshot.location,
            recorded_at: now,
        });
        let overflow = self.history.len().saturating_sub(history_limit.max(1));
        if overflow > 0 {
            self.history.drain(..overflow);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    ReachedDestination,
    UserEnded,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::ReachedDestination => "reached_destination",
            EndReason::UserEnded => "user_ended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndedResponse {
    pub status: String,
    pub reason: EndReason,
}

impl SessionEndedResponse {
    pub fn new(reason: EndReason) -> Self {
        Self {
            status: "ended".to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            location: Coordinate::new(40.0, -74.0),
            destination: Coordinate::new(40.1, -74.1),
            battery_level: 0.8,
            radius: 50.0,
            distance: 0.0,
            place_name: Some("Home".into()),
        }
    }

    #[test]
    fn snapshot_uses_camel_case_wire_names() {
        let json = serde_json::json!({
            "location": {"lat": 1.0, "long": 2.0},
            "destination": {"lat": 3.0, "long": 4.0},
            "batteryLevel": 0.5,
            "radius": 25.0,
            "distance": 1200.0,
            "placeName": "School"
        });
        let parsed: SessionSnapshot = serde_json::from_value(json).expect("parse");
        assert_eq!(parsed.location, Coordinate::new(1.0, 2.0));
        assert_eq!(parsed.place_name.as_deref(), Some("School"));
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn snapshot_rejects_out_of_range_values() {
        let mut bad = snapshot();
        bad.location.lat = 91.0;
        assert!(bad.validate().is_err());

        let mut bad = snapshot();
        bad.radius = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = snapshot();
        bad.distance = -5.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn update_appends_history_and_keeps_place_name_when_omitted() {
        let now = Utc::now();
        let mut session =
            CheckInSession::start(FamilyId::new(), UserId::new(), &snapshot(), 1000.0, now);
        let mut next = snapshot();
        next.place_name = None;
        next.location = Coordinate::new(40.05, -74.05);
        session.apply_update(&next, 600.0, 0, now, DEFAULT_HISTORY_LIMIT);

        assert_eq!(session.history.len(), 2);
        assert_eq!(session.place_name.as_deref(), Some("Home"));
        assert_eq!(session.distance, 600.0);
        assert_eq!(session.location, next.location);
    }

    #[test]
    fn update_keeps_the_radius_chosen_at_start() {
        let now = Utc::now();
        let mut session =
            CheckInSession::start(FamilyId::new(), UserId::new(), &snapshot(), 1000.0, now);
        let mut next = snapshot();
        next.radius = 6000.0;
        session.apply_update(&next, 900.0, 0, now, DEFAULT_HISTORY_LIMIT);

        assert_eq!(session.radius, 50.0);
    }

    #[test]
    fn history_drops_the_oldest_samples_past_the_limit() {
        let start = Utc::now();
        let mut session =
            CheckInSession::start(FamilyId::new(), UserId::new(), &snapshot(), 1000.0, start);
        for step in 1..=5 {
            let mut next = snapshot();
            next.location = Coordinate::new(40.0 + step as f64, -74.0);
            let at = start + chrono::Duration::seconds(step);
            session.apply_update(&next, 900.0, 0, at, 3);
        }

        assert_eq!(session.history.len(), 3);
        assert_eq!(session.history[0].location, Coordinate::new(43.0, -74.0));
        assert_eq!(session.history[2].location, Coordinate::new(45.0, -74.0));
    }
}
