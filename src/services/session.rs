//! Telemetry session state
//!
//! One live instance per coordinator, reset at every session stop. Mutated
//! only by the coordinator's own tasks; event assembly reads it under the
//! same lock.

use crate::domain::types::{new_uuid_v7, Route, RouteProgress};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Internal sub-state of a telemetry session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Inactive,
    AwaitingRoute,
    Started,
    Monitoring,
    Terminating,
}

impl SessionPhase {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Inactive => "inactive",
            SessionPhase::AwaitingRoute => "awaiting_route",
            SessionPhase::Started => "started",
            SessionPhase::Monitoring => "monitoring",
            SessionPhase::Terminating => "terminating",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub trip_id: String,
    pub phase: SessionPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    /// Invariant: `started` implies `original_route.is_some()`
    pub started: bool,
    pub route_arrived: bool,
    /// Set once the Arrive or Cancel event was decided
    pub terminated: bool,
    /// Meters traveled on routes abandoned by reroutes
    pub rerouted_distance: f64,
    pub distance_completed: f64,
    pub distance_remaining: f64,
    pub duration_remaining: f64,
    pub reroute_count: u32,
    pub last_reroute_at: Option<Instant>,
    pub original_route: Option<Route>,
    pub current_route: Option<Route>,
    pub heartbeat_count: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            session_id: new_uuid_v7(),
            trip_id: new_uuid_v7(),
            phase: SessionPhase::Inactive,
            started_at: None,
            arrived_at: None,
            started: false,
            route_arrived: false,
            terminated: false,
            rerouted_distance: 0.0,
            distance_completed: 0.0,
            distance_remaining: 0.0,
            duration_remaining: 0.0,
            reroute_count: 0,
            last_reroute_at: None,
            original_route: None,
            current_route: None,
            heartbeat_count: 0,
        }
    }

    /// Zero all counters and regenerate identifiers
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Session is active for reporting purposes
    pub fn is_available(&self) -> bool {
        self.original_route.is_some() && self.started
    }

    /// Record the resolved original route and mark the session started
    pub fn start(&mut self, route: Route) {
        self.distance_remaining = route.distance;
        self.duration_remaining = route.duration;
        self.original_route = Some(route.clone());
        self.current_route = Some(route);
        self.session_id = new_uuid_v7();
        self.trip_id = new_uuid_v7();
        self.started_at = Some(Utc::now());
        self.started = true;
        self.phase = SessionPhase::Started;
    }

    /// Distance completed is recomputed from each sample, never accumulated from deltas
    pub fn apply_progress(&mut self, progress: &RouteProgress) {
        self.distance_completed = self.rerouted_distance + progress.distance_traveled.max(0.0);
    }

    pub fn refresh_remaining(&mut self, progress: &RouteProgress) {
        self.distance_remaining = progress.distance_remaining.max(0.0);
        self.duration_remaining = progress.duration_remaining.max(0.0);
    }

    /// Decide the arrival terminal. Returns false if the session is not
    /// started or already terminated.
    pub fn mark_arrived(&mut self) -> bool {
        if !self.started || self.terminated {
            return false;
        }
        self.arrived_at = Some(Utc::now());
        self.route_arrived = true;
        self.terminated = true;
        self.phase = SessionPhase::Terminating;
        true
    }

    /// Decide the cancellation terminal. Returns false if the session is
    /// not started or already terminated.
    pub fn begin_cancel(&mut self) -> bool {
        if !self.started || self.terminated {
            return false;
        }
        self.terminated = true;
        self.phase = SessionPhase::Terminating;
        true
    }

    /// Count a deviation. Returns the time since the previous one.
    pub fn record_reroute(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let since = self.last_reroute_at.map(|at| now.duration_since(at));
        self.reroute_count += 1;
        self.last_reroute_at = Some(now);
        since
    }

    /// Switch to the replacement route
    pub fn apply_reroute(&mut self, route: Route) {
        self.rerouted_distance = self.distance_completed;
        self.distance_remaining = route.distance;
        self.duration_remaining = route.duration;
        self.current_route = Some(route);
    }

    pub fn rotate_trip_id(&mut self) {
        self.trip_id = new_uuid_v7();
    }
}
