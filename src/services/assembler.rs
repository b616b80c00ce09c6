//! Event assembly
//!
//! Pure mapping from a session snapshot plus the latest location/progress
//! to the collector payloads. Defaults when source data is absent:
//!
//! | field                            | default                        |
//! |----------------------------------|--------------------------------|
//! | `lat`, `lng`                     | 0.0 (no fix seen)              |
//! | `startTimestamp`                 | omitted (session not started)  |
//! | `profile`                        | "" (no route)                  |
//! | `percentDistanceTraveled`        | 0 when traveled + remaining is 0 |
//! | `legIndex`, `stepIndex`          | -1 (no progress)               |
//! | `legCount`, `stepCount`          | 0 (no route)                   |
//! | `absoluteDistanceToDestination`  | -1 (no fix or no destination)  |
//! | `original*` / route metrics      | omitted / 0 (no route)         |
//!
//! `percentDistanceTraveled` is a percentage in `0..=100`, i.e. the ratio
//! traveled / (traveled + remaining) scaled by 100.

use crate::domain::event::{
    ArriveEvent, CancelEvent, DepartEvent, EventEnvelope, FeedbackEvent, PhoneState,
    RerouteEvent, TelemetryEvent, TurnstileEvent, EVENT_VERSION, UNKNOWN,
};
use crate::domain::types::{Location, Route, RouteProgress, UserFeedback};
use crate::services::session::SessionState;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

/// Everything an event needs besides its variant fields
pub struct EventContext<'a> {
    pub session: &'a SessionState,
    pub sdk_identifier: &'a str,
    pub sdk_version: &'a str,
    pub location: Option<Location>,
    pub progress: Option<RouteProgress>,
    pub phone: PhoneState,
    pub created: DateTime<Utc>,
}

#[inline]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Share of the trip already driven, in percent
pub fn percent_distance_traveled(traveled: f64, remaining: f64) -> f64 {
    let total = traveled + remaining;
    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }
    (100.0 * traveled / total).clamp(0.0, 100.0)
}

/// Straight-line meters from the fix to the route destination
pub fn distance_to_destination(location: Option<&Location>, route: Option<&Route>) -> i32 {
    match (location, route.and_then(|r| r.destination)) {
        (Some(location), Some(destination)) => {
            location.point().distance_to(&destination).round() as i32
        }
        _ => UNKNOWN,
    }
}

fn index_or_unknown(index: Option<usize>) -> i32 {
    index.map(|i| i as i32).unwrap_or(UNKNOWN)
}

pub fn envelope(ctx: &EventContext<'_>) -> EventEnvelope {
    let session = ctx.session;
    let current = session.current_route.as_ref();
    let original = session.original_route.as_ref();

    EventEnvelope {
        created: format_timestamp(&ctx.created),
        sdk_identifier: ctx.sdk_identifier.to_string(),
        sdk_version: ctx.sdk_version.to_string(),
        event_version: EVENT_VERSION,
        session_identifier: session.session_id.clone(),
        trip_identifier: session.trip_id.clone(),
        start_timestamp: session.started_at.as_ref().map(format_timestamp),
        lat: ctx.location.as_ref().map(|l| l.latitude).unwrap_or(0.0),
        lng: ctx.location.as_ref().map(|l| l.longitude).unwrap_or(0.0),
        profile: current.or(original).map(|r| r.profile.clone()).unwrap_or_default(),
        distance_completed: session.distance_completed,
        distance_remaining: session.distance_remaining,
        duration_remaining: session.duration_remaining,
        percent_distance_traveled: percent_distance_traveled(
            session.distance_completed,
            session.distance_remaining,
        ),
        leg_index: index_or_unknown(ctx.progress.as_ref().map(|p| p.leg_index)),
        leg_count: current.map(|r| r.leg_count() as u32).unwrap_or(0),
        step_index: index_or_unknown(ctx.progress.as_ref().map(|p| p.step_index)),
        step_count: current.map(|r| r.step_count() as u32).unwrap_or(0),
        reroute_count: session.reroute_count,
        absolute_distance_to_destination: distance_to_destination(ctx.location.as_ref(), current),
        original_request_identifier: original.and_then(|r| r.request_id.clone()),
        original_geometry: original.map(|r| r.geometry.clone()),
        original_estimated_distance: original.map(|r| r.distance).unwrap_or(0.0),
        original_estimated_duration: original.map(|r| r.duration).unwrap_or(0.0),
        original_step_count: original.map(|r| r.step_count() as u32).unwrap_or(0),
        request_identifier: current.and_then(|r| r.request_id.clone()),
        geometry: current.map(|r| r.geometry.clone()),
        estimated_distance: current.map(|r| r.distance).unwrap_or(0.0),
        estimated_duration: current.map(|r| r.duration).unwrap_or(0.0),
        total_step_count: current.map(|r| r.step_count() as u32).unwrap_or(0),
        phone: ctx.phone.clone(),
    }
}

pub fn depart(ctx: &EventContext<'_>) -> TelemetryEvent {
    TelemetryEvent::Depart(DepartEvent { envelope: envelope(ctx) })
}

/// Arrival time falls back to the creation time if not recorded
pub fn arrive(ctx: &EventContext<'_>) -> TelemetryEvent {
    let arrived_at = ctx.session.arrived_at.unwrap_or(ctx.created);
    TelemetryEvent::Arrive(ArriveEvent {
        envelope: envelope(ctx),
        arrival_timestamp: format_timestamp(&arrived_at),
    })
}

pub fn cancel(ctx: &EventContext<'_>) -> TelemetryEvent {
    TelemetryEvent::Cancel(CancelEvent {
        envelope: envelope(ctx),
        arrival_timestamp: ctx.session.arrived_at.as_ref().map(format_timestamp),
    })
}

/// Location arrays are left empty; the capture window fills them in
pub fn reroute(
    ctx: &EventContext<'_>,
    new_route: &Route,
    seconds_since_last_reroute: i64,
    feedback_id: String,
) -> RerouteEvent {
    RerouteEvent {
        envelope: envelope(ctx),
        feedback_id,
        new_distance_remaining: new_route.distance,
        new_duration_remaining: new_route.duration,
        new_geometry: new_route.geometry.clone(),
        seconds_since_last_reroute,
        locations_before: Vec::new(),
        locations_after: Vec::new(),
    }
}

/// Location arrays are left empty; the capture window fills them in
pub fn feedback(
    ctx: &EventContext<'_>,
    input: &UserFeedback,
    user_id: &str,
    feedback_id: String,
) -> FeedbackEvent {
    FeedbackEvent {
        envelope: envelope(ctx),
        feedback_id,
        user_id: user_id.to_string(),
        feedback_type: input.feedback_type.clone(),
        description: input.description.clone(),
        source: input.source.clone(),
        screenshot: input.screenshot.as_ref().map(|bytes| BASE64.encode(bytes)),
        feedback_sub_type: input.sub_types.clone(),
        app_metadata: input.metadata.clone(),
        locations_before: Vec::new(),
        locations_after: Vec::new(),
    }
}

pub fn turnstile(
    sdk_identifier: &str,
    sdk_version: &str,
    user_id: &str,
    phone: &PhoneState,
    created: DateTime<Utc>,
) -> TelemetryEvent {
    TelemetryEvent::Turnstile(TurnstileEvent {
        created: format_timestamp(&created),
        user_id: user_id.to_string(),
        enabled_telemetry: true,
        device: phone.device.clone(),
        operating_system: phone.operating_system.clone(),
        sdk_identifier: sdk_identifier.to_string(),
        sdk_version: sdk_version.to_string(),
        event_version: EVENT_VERSION,
    })
}
