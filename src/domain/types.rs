//! Shared types for navigation engine inputs
//!
//! These mirror what the navigation engine hands to its observers: location
//! fixes, routes, route progress and the high-level session state.

use crate::domain::event::AppMetadata;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Mean earth radius in meters (IUGG)
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to another point in meters (haversine)
    pub fn distance_to(&self, other: &Point) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lng - self.lng).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// A single location fix (map-matched "enhanced" location)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
    /// Fix time (epoch ms)
    pub timestamp: u64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, timestamp: u64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            speed: None,
            bearing: None,
            horizontal_accuracy: None,
            timestamp,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.latitude, self.longitude)
    }
}

/// A maneuver step within a leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    /// Meters
    pub distance: f64,
    /// Seconds
    pub duration: f64,
}

/// One leg of a route (origin or waypoint to next waypoint)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteLeg {
    #[serde(default)]
    pub steps: Vec<RouteStep>,
}

/// A computed route as delivered by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Directions request identifier (if known)
    #[serde(default)]
    pub request_id: Option<String>,
    /// Encoded polyline geometry
    #[serde(default)]
    pub geometry: String,
    /// Total distance in meters
    pub distance: f64,
    /// Total expected duration in seconds
    pub duration: f64,
    /// Directions profile (driving, walking, ...)
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
    /// Final destination coordinate
    #[serde(default)]
    pub destination: Option<Point>,
}

fn default_profile() -> String {
    "driving-traffic".to_string()
}

impl Route {
    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    /// Number of steps across all legs
    pub fn step_count(&self) -> usize {
        self.legs.iter().map(|leg| leg.steps.len()).sum()
    }
}

/// Progress state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteProgressState {
    Initialized,
    LocationTracking,
    LocationStale,
    OffRoute,
    RouteComplete,
    Uncertain,
}

impl RouteProgressState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteProgressState::Initialized => "initialized",
            RouteProgressState::LocationTracking => "location_tracking",
            RouteProgressState::LocationStale => "location_stale",
            RouteProgressState::OffRoute => "off_route",
            RouteProgressState::RouteComplete => "route_complete",
            RouteProgressState::Uncertain => "uncertain",
        }
    }
}

/// Progress along the active route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteProgress {
    pub state: RouteProgressState,
    /// Meters traveled on the current route
    pub distance_traveled: f64,
    /// Meters left on the current route
    pub distance_remaining: f64,
    /// Seconds left on the current route
    pub duration_remaining: f64,
    #[serde(default)]
    pub leg_index: usize,
    #[serde(default)]
    pub step_index: usize,
}

/// High-level navigation session state from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationState {
    Idle,
    FreeDrive,
    ActiveGuidance,
}

impl NavigationState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationState::Idle => "idle",
            NavigationState::FreeDrive => "free_drive",
            NavigationState::ActiveGuidance => "active_guidance",
        }
    }
}

/// Where user feedback is routed at call time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackRouting {
    #[default]
    Inactive,
    Active,
}

/// User-submitted feedback as handed over by the host application
#[derive(Debug, Clone, PartialEq)]
pub struct UserFeedback {
    pub feedback_type: String,
    pub description: String,
    /// Where the report came from (user, reroute prompt, ...)
    pub source: String,
    /// Raw screenshot image bytes
    pub screenshot: Option<Bytes>,
    pub sub_types: Vec<String>,
    pub metadata: Option<AppMetadata>,
}

impl UserFeedback {
    pub fn new(feedback_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            feedback_type: feedback_type.into(),
            description: description.into(),
            source: "user".to_string(),
            screenshot: None,
            sub_types: Vec::new(),
            metadata: None,
        }
    }
}
