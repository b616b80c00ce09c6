//! Analytics event payloads sent to the collector
//!
//! Every session event carries the same flat envelope; the variant adds its
//! own fields next to it. Field names are part of the collector contract and
//! are versioned through `eventVersion`.

use crate::domain::types::Location;
use serde::{Deserialize, Serialize};

/// Schema version tag carried by every event
pub const EVENT_VERSION: u32 = 7;

/// Sentinel for numeric fields whose source data is absent
pub const UNKNOWN: i32 = -1;

/// Device / phone state at the time of the event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneState {
    pub device: String,
    pub operating_system: String,
    /// Percent, -1 when unknown
    pub battery_level: i32,
    pub battery_plugged_in: bool,
    pub connectivity: String,
    pub audio_type: String,
    pub application_state: String,
    /// Percent, -1 when unknown
    pub volume_level: i32,
    /// Percent, -1 when unknown
    pub screen_brightness: i32,
}

/// Common envelope shared by all session events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// RFC 3339 creation time
    pub created: String,
    pub sdk_identifier: String,
    pub sdk_version: String,
    pub event_version: u32,
    pub session_identifier: String,
    pub trip_identifier: String,
    /// RFC 3339 session start, absent before the session started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<String>,
    /// Last known latitude, 0.0 when no fix was seen
    pub lat: f64,
    /// Last known longitude, 0.0 when no fix was seen
    pub lng: f64,
    pub profile: String,
    /// Meters completed across the whole session
    pub distance_completed: f64,
    /// Meters left on the current route
    pub distance_remaining: f64,
    /// Seconds left on the current route
    pub duration_remaining: f64,
    /// 0..=100
    pub percent_distance_traveled: f64,
    /// -1 without progress
    pub leg_index: i32,
    pub leg_count: u32,
    /// -1 without progress
    pub step_index: i32,
    pub step_count: u32,
    pub reroute_count: u32,
    /// Meters from last fix to route destination, -1 when either is absent
    pub absolute_distance_to_destination: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_request_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_geometry: Option<String>,
    /// Meters, 0 without an original route
    pub original_estimated_distance: f64,
    /// Seconds, 0 without an original route
    pub original_estimated_duration: f64,
    pub original_step_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    pub estimated_distance: f64,
    pub estimated_duration: f64,
    pub total_step_count: u32,
    #[serde(flatten)]
    pub phone: PhoneState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArriveEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub arrival_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    /// Last known arrival time, if the session ever arrived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerouteEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub feedback_id: String,
    pub new_distance_remaining: f64,
    pub new_duration_remaining: f64,
    pub new_geometry: String,
    /// -1 for the first reroute of a session
    pub seconds_since_last_reroute: i64,
    pub locations_before: Vec<Location>,
    pub locations_after: Vec<Location>,
}

/// Application metadata attached to user feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    pub feedback_id: String,
    pub user_id: String,
    pub feedback_type: String,
    pub description: String,
    pub source: String,
    /// Base64 encoded screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub feedback_sub_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<AppMetadata>,
    pub locations_before: Vec<Location>,
    pub locations_after: Vec<Location>,
}

/// App-level activation event, not tied to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnstileEvent {
    pub created: String,
    pub user_id: String,
    pub enabled_telemetry: bool,
    pub device: String,
    pub operating_system: String,
    pub sdk_identifier: String,
    pub sdk_version: String,
    pub event_version: u32,
}

/// Event kind (for counters and logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Depart,
    Arrive,
    Cancel,
    Reroute,
    Feedback,
    Turnstile,
}

impl EventKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Depart => "navigation.depart",
            EventKind::Arrive => "navigation.arrive",
            EventKind::Cancel => "navigation.cancel",
            EventKind::Reroute => "navigation.reroute",
            EventKind::Feedback => "navigation.feedback",
            EventKind::Turnstile => "appUserTurnstile",
        }
    }
}

/// An analytics event handed to the reporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TelemetryEvent {
    #[serde(rename = "navigation.depart")]
    Depart(DepartEvent),
    #[serde(rename = "navigation.arrive")]
    Arrive(ArriveEvent),
    #[serde(rename = "navigation.cancel")]
    Cancel(CancelEvent),
    #[serde(rename = "navigation.reroute")]
    Reroute(RerouteEvent),
    #[serde(rename = "navigation.feedback")]
    Feedback(FeedbackEvent),
    #[serde(rename = "appUserTurnstile")]
    Turnstile(TurnstileEvent),
}

impl TelemetryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TelemetryEvent::Depart(_) => EventKind::Depart,
            TelemetryEvent::Arrive(_) => EventKind::Arrive,
            TelemetryEvent::Cancel(_) => EventKind::Cancel,
            TelemetryEvent::Reroute(_) => EventKind::Reroute,
            TelemetryEvent::Feedback(_) => EventKind::Feedback,
            TelemetryEvent::Turnstile(_) => EventKind::Turnstile,
        }
    }

    /// Session envelope, absent for app-level events
    pub fn envelope(&self) -> Option<&EventEnvelope> {
        match self {
            TelemetryEvent::Depart(e) => Some(&e.envelope),
            TelemetryEvent::Arrive(e) => Some(&e.envelope),
            TelemetryEvent::Cancel(e) => Some(&e.envelope),
            TelemetryEvent::Reroute(e) => Some(&e.envelope),
            TelemetryEvent::Feedback(e) => Some(&e.envelope),
            TelemetryEvent::Turnstile(_) => None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.envelope().map(|e| e.session_identifier.as_str())
    }

    /// Single-line JSON for JSONL egress and MQTT payloads
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> EventEnvelope {
        EventEnvelope {
            created: "2026-01-05T12:00:00.000Z".to_string(),
            sdk_identifier: "nav-telemetry".to_string(),
            sdk_version: "0.1.0".to_string(),
            event_version: EVENT_VERSION,
            session_identifier: "s-1".to_string(),
            trip_identifier: "t-1".to_string(),
            start_timestamp: Some("2026-01-05T11:50:00.000Z".to_string()),
            lat: 59.33,
            lng: 18.06,
            profile: "driving-traffic".to_string(),
            distance_completed: 1200.0,
            distance_remaining: 800.0,
            duration_remaining: 95.5,
            percent_distance_traveled: 60.0,
            leg_index: 0,
            leg_count: 1,
            step_index: 3,
            step_count: 7,
            reroute_count: 1,
            absolute_distance_to_destination: 640,
            original_request_identifier: Some("req-1".to_string()),
            original_geometry: Some("_p~iF~ps|U".to_string()),
            original_estimated_distance: 2000.0,
            original_estimated_duration: 240.0,
            original_step_count: 7,
            request_identifier: Some("req-2".to_string()),
            geometry: Some("_ulLnnqC".to_string()),
            estimated_distance: 1900.0,
            estimated_duration: 230.0,
            total_step_count: 7,
            phone: PhoneState {
                device: "pixel".to_string(),
                operating_system: "android 15".to_string(),
                battery_level: 80,
                battery_plugged_in: false,
                connectivity: "wifi".to_string(),
                audio_type: "speaker".to_string(),
                application_state: "foreground".to_string(),
                volume_level: UNKNOWN,
                screen_brightness: UNKNOWN,
            },
        }
    }

    #[test]
    fn test_event_tag_and_flat_envelope() {
        let event = TelemetryEvent::Depart(DepartEvent { envelope: sample_envelope() });
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["event"], "navigation.depart");
        assert_eq!(value["sessionIdentifier"], "s-1");
        assert_eq!(value["eventVersion"], EVENT_VERSION);
        // Phone state is flattened into the top level
        assert_eq!(value["batteryLevel"], 80);
        assert_eq!(value["screenBrightness"], -1);
    }

    #[test]
    fn test_reroute_event_survives_reporter_round_trip() {
        let event = TelemetryEvent::Reroute(RerouteEvent {
            envelope: sample_envelope(),
            feedback_id: "f-1".to_string(),
            new_distance_remaining: 1500.0,
            new_duration_remaining: 180.0,
            new_geometry: "abc".to_string(),
            seconds_since_last_reroute: -1,
            locations_before: vec![Location::new(59.0, 18.0, 1_000)],
            locations_after: vec![Location::new(59.1, 18.1, 2_000)],
        });

        let parsed: TelemetryEvent = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.kind(), EventKind::Reroute);
    }

    #[test]
    fn test_turnstile_has_no_session() {
        let event = TelemetryEvent::Turnstile(TurnstileEvent {
            created: "2026-01-05T12:00:00.000Z".to_string(),
            user_id: "u-1".to_string(),
            enabled_telemetry: true,
            device: "pixel".to_string(),
            operating_system: "android".to_string(),
            sdk_identifier: "nav-telemetry".to_string(),
            sdk_version: "0.1.0".to_string(),
            event_version: EVENT_VERSION,
        });
        assert!(event.session_id().is_none());
        assert!(event.to_json().contains("\"event\":\"appUserTurnstile\""));
    }
}
