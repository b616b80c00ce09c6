//! Session event dispatcher
//!
//! Single landing point for every navigation engine callback. Keeps
//! latest-value caches, the per-session deferred values (first location,
//! original route) and the conflated mailboxes consumed by the coordinator.

use crate::domain::types::{Location, Route, RouteProgress, RouteProgressState};
use crate::infra::metrics::Metrics;
use crate::services::capture_window::WindowTracker;
use crate::services::deferred::Deferred;
use crate::services::mailbox::Mailbox;
use crate::services::ring_buffer::RingBuffer;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Deferred values owned by one session
#[derive(Clone)]
pub struct SessionDeferreds {
    pub first_location: Deferred<Location>,
    pub original_route: Deferred<Route>,
}

impl SessionDeferreds {
    fn new() -> Self {
        Self { first_location: Deferred::new(), original_route: Deferred::new() }
    }
}

pub struct SessionEventDispatcher {
    locations: RingBuffer<Location>,
    windows: WindowTracker<Location>,
    route_mailbox: Mailbox<Route>,
    progress_mailbox: Mailbox<RouteProgress>,
    off_route_mailbox: Mailbox<bool>,
    routes: RwLock<Vec<Route>>,
    latest_progress: RwLock<Option<RouteProgress>>,
    /// Set once a route-complete progress has been published
    route_completed: AtomicBool,
    deferreds: Mutex<SessionDeferreds>,
    metrics: Arc<Metrics>,
}

impl SessionEventDispatcher {
    /// `buffer_size` bounds both the location history and the post-trigger
    /// sample count of every capture window
    pub fn new(buffer_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            locations: RingBuffer::new(buffer_size),
            windows: WindowTracker::new(buffer_size),
            route_mailbox: Mailbox::new(),
            progress_mailbox: Mailbox::new(),
            off_route_mailbox: Mailbox::new(),
            routes: RwLock::new(Vec::new()),
            latest_progress: RwLock::new(None),
            route_completed: AtomicBool::new(false),
            deferreds: Mutex::new(SessionDeferreds::new()),
            metrics,
        }
    }

    /// Map-matched location update
    pub fn on_enhanced_location(&self, location: Location) {
        self.metrics.record_location_update();
        self.locations.push(location.clone());

        let fired = self.windows.on_sample(location.clone());
        if fired > 0 {
            self.metrics.record_windows_completed(fired as u64);
        }

        let first_location = self.deferreds.lock().first_location.clone();
        if first_location.complete(location) {
            debug!("first_location_resolved");
        }
    }

    /// Raw (unmatched) fixes are not used for telemetry
    pub fn on_raw_location(&self, _location: &Location) {
        trace!("raw_location_ignored");
    }

    pub fn on_routes_changed(&self, routes: Vec<Route>) {
        let primary = routes.first().cloned();
        *self.routes.write() = routes;

        let Some(route) = primary else {
            debug!("routes_cleared");
            return;
        };

        self.route_mailbox.offer(route.clone());
        let original_route = self.deferreds.lock().original_route.clone();
        if original_route.complete(route) {
            debug!("original_route_resolved");
        }
    }

    pub fn on_route_progress(&self, progress: RouteProgress) {
        self.metrics.record_progress_update();
        *self.latest_progress.write() = Some(progress.clone());

        if self.route_completed.load(Ordering::Acquire) {
            trace!(state = %progress.state.as_str(), "route_progress_after_complete");
            return;
        }
        if progress.state == RouteProgressState::RouteComplete {
            self.route_completed.store(true, Ordering::Release);
        }
        self.progress_mailbox.offer(progress);
    }

    pub fn on_off_route(&self, off_route: bool) {
        self.off_route_mailbox.offer(off_route);
    }

    /// Re-arm progress publishing for a new session
    pub fn reset_route_progress_processor(&self) {
        self.route_completed.store(false, Ordering::Release);
    }

    /// Replace the original-route deferred with a fresh one
    pub fn clear_original_route(&self) {
        self.deferreds.lock().original_route = Deferred::new();
    }

    /// Replace the first-location deferred with a fresh one
    pub fn rearm_first_location(&self) {
        self.deferreds.lock().first_location = Deferred::new();
    }

    /// Hand out the deferreds for a starting session.
    ///
    /// The original route is seeded from the current primary route when no
    /// routes-changed callback arrived since the last boundary. Stale values
    /// left in the mailboxes by a previous session are discarded.
    pub fn begin_session(&self) -> SessionDeferreds {
        let deferreds = self.deferreds.lock().clone();
        if let Some(route) = self.primary_route() {
            if deferreds.original_route.complete(route) {
                debug!("original_route_seeded");
            }
        }
        self.route_mailbox.try_recv();
        self.progress_mailbox.try_recv();
        self.off_route_mailbox.try_recv();
        deferreds
    }

    /// Close all mailboxes so consumers stop
    pub fn close(&self) {
        self.route_mailbox.close();
        self.progress_mailbox.close();
        self.off_route_mailbox.close();
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.read().clone()
    }

    pub fn has_routes(&self) -> bool {
        !self.routes.read().is_empty()
    }

    pub fn primary_route(&self) -> Option<Route> {
        self.routes.read().first().cloned()
    }

    pub fn latest_progress(&self) -> Option<RouteProgress> {
        self.latest_progress.read().clone()
    }

    pub fn latest_location(&self) -> Option<Location> {
        self.locations.latest()
    }

    /// Recent fixes, newest first
    pub fn location_snapshot(&self) -> Vec<Location> {
        self.locations.snapshot()
    }

    pub fn windows(&self) -> &WindowTracker<Location> {
        &self.windows
    }

    pub fn route_mailbox(&self) -> &Mailbox<Route> {
        &self.route_mailbox
    }

    pub fn progress_mailbox(&self) -> &Mailbox<RouteProgress> {
        &self.progress_mailbox
    }

    pub fn off_route_mailbox(&self) -> &Mailbox<bool> {
        &self.off_route_mailbox
    }

    /// Deferreds currently armed for the next/ongoing session
    pub fn current_deferreds(&self) -> SessionDeferreds {
        self.deferreds.lock().clone()
    }
}
