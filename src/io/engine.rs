//! Navigation engine observer seam
//!
//! The engine delivers its callbacks to every registered observer. The hub
//! stands in for the engine side of that contract: register/unregister are
//! idempotent and publishing fans out to the current observer set.

use crate::domain::types::{Location, NavigationState, Route, RouteProgress};
use crate::infra::error::TelemetryError;
use crate::services::coordinator::TelemetryCoordinator;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

pub trait NavigationObserver: Send + Sync {
    fn on_location_changed(
        &self,
        raw: &Location,
        enhanced: Location,
        key_points: &[Location],
    ) -> Result<(), TelemetryError>;

    fn on_routes_changed(&self, routes: Vec<Route>) -> Result<(), TelemetryError>;

    fn on_route_progress_changed(&self, progress: RouteProgress) -> Result<(), TelemetryError>;

    fn on_off_route_state_changed(&self, off_route: bool) -> Result<(), TelemetryError>;

    fn on_session_state_changed(&self, state: NavigationState) -> Result<(), TelemetryError>;
}

impl NavigationObserver for TelemetryCoordinator {
    fn on_location_changed(
        &self,
        raw: &Location,
        enhanced: Location,
        key_points: &[Location],
    ) -> Result<(), TelemetryError> {
        TelemetryCoordinator::on_location_changed(self, raw, enhanced, key_points)
    }

    fn on_routes_changed(&self, routes: Vec<Route>) -> Result<(), TelemetryError> {
        TelemetryCoordinator::on_routes_changed(self, routes)
    }

    fn on_route_progress_changed(&self, progress: RouteProgress) -> Result<(), TelemetryError> {
        TelemetryCoordinator::on_route_progress_changed(self, progress)
    }

    fn on_off_route_state_changed(&self, off_route: bool) -> Result<(), TelemetryError> {
        TelemetryCoordinator::on_off_route_state_changed(self, off_route)
    }

    fn on_session_state_changed(&self, state: NavigationState) -> Result<(), TelemetryError> {
        TelemetryCoordinator::on_session_state_changed(self, state)
    }
}

#[inline]
fn same_observer(a: &Arc<dyn NavigationObserver>, b: &Arc<dyn NavigationObserver>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Registry of engine observers
#[derive(Default)]
pub struct ObserverHub {
    observers: RwLock<Vec<Arc<dyn NavigationObserver>>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the observer was already registered
    pub fn register(&self, observer: Arc<dyn NavigationObserver>) -> bool {
        let mut observers = self.observers.write();
        if observers.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }
        observers.push(observer);
        debug!(observers = %observers.len(), "observer_registered");
        true
    }

    /// Returns false if the observer was not registered
    pub fn unregister(&self, observer: &Arc<dyn NavigationObserver>) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        let removed = observers.len() != before;
        if removed {
            debug!(observers = %observers.len(), "observer_unregistered");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    // Observers are called outside the registry lock
    fn snapshot(&self) -> Vec<Arc<dyn NavigationObserver>> {
        self.observers.read().clone()
    }

    fn report(result: Result<(), TelemetryError>, callback: &'static str) {
        if let Err(e) = result {
            warn!(callback = %callback, error = %e, "observer_callback_failed");
        }
    }

    pub fn publish_location(&self, raw: &Location, enhanced: &Location, key_points: &[Location]) {
        for observer in self.snapshot() {
            let result = observer.on_location_changed(raw, enhanced.clone(), key_points);
            Self::report(result, "location");
        }
    }

    pub fn publish_routes(&self, routes: &[Route]) {
        for observer in self.snapshot() {
            Self::report(observer.on_routes_changed(routes.to_vec()), "routes");
        }
    }

    pub fn publish_progress(&self, progress: &RouteProgress) {
        for observer in self.snapshot() {
            Self::report(observer.on_route_progress_changed(progress.clone()), "progress");
        }
    }

    pub fn publish_off_route(&self, off_route: bool) {
        for observer in self.snapshot() {
            Self::report(observer.on_off_route_state_changed(off_route), "off_route");
        }
    }

    pub fn publish_session_state(&self, state: NavigationState) {
        for observer in self.snapshot() {
            Self::report(observer.on_session_state_changed(state), "session_state");
        }
    }
}
