//! Telemetry session lifecycle coordination
//!
//! The coordinator owns everything between `initialize` and `shutdown`:
//! - the session event dispatcher (engine callbacks land here)
//! - the session state record and the metrics gate in front of the reporter
//! - the per-session task scope (monitoring loop, off-route watcher,
//!   reroute waits) rooted in a cancellation token
//!
//! Exactly one of Arrive or Cancel is emitted for every started session.

mod lifecycle;
#[cfg(test)]
mod tests;

use crate::domain::types::{
    FeedbackRouting, Location, NavigationState, Route, RouteProgress, UserFeedback,
};
use crate::infra::config::Config;
use crate::infra::error::TelemetryError;
use crate::infra::metrics::Metrics;
use crate::io::device::{DeviceStateProvider, StaticDeviceState};
use crate::io::reporter::TelemetryReporter;
use crate::services::assembler::EventContext;
use crate::services::dispatcher::SessionEventDispatcher;
use crate::services::metrics_gate::MetricsGate;
use crate::services::session::SessionState;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Task scope of one telemetry session
pub(crate) struct SessionScope {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
}

/// State that lives for one `initialize`..`shutdown` bracket
pub(crate) struct CoordinatorRuntime {
    pub(crate) config: Config,
    pub(crate) handle: Handle,
    pub(crate) root: CancellationToken,
    pub(crate) dispatcher: Arc<SessionEventDispatcher>,
    pub(crate) session: Arc<Mutex<SessionState>>,
    pub(crate) gate: Arc<MetricsGate>,
    pub(crate) device: Arc<dyn DeviceStateProvider>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) feedback_routing: Mutex<FeedbackRouting>,
    pub(crate) nav_state: Mutex<NavigationState>,
    pub(crate) scope: Mutex<Option<SessionScope>>,
    pub(crate) generation: AtomicU64,
}

impl CoordinatorRuntime {
    fn new(
        config: Config,
        handle: Handle,
        reporter: Arc<dyn TelemetryReporter>,
        device: Arc<dyn DeviceStateProvider>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let dispatcher =
            Arc::new(SessionEventDispatcher::new(config.location_buffer_size(), metrics.clone()));
        Self {
            handle,
            root: CancellationToken::new(),
            dispatcher,
            session: Arc::new(Mutex::new(SessionState::new())),
            gate: Arc::new(MetricsGate::new(reporter, metrics.clone())),
            device,
            metrics,
            feedback_routing: Mutex::new(FeedbackRouting::Inactive),
            nav_state: Mutex::new(NavigationState::Idle),
            scope: Mutex::new(None),
            generation: AtomicU64::new(0),
            config,
        }
    }

    /// Assembly context over the latest dispatcher caches
    pub(crate) fn context<'a>(
        &'a self,
        session: &'a SessionState,
        location: Option<Location>,
    ) -> EventContext<'a> {
        EventContext {
            session,
            sdk_identifier: self.config.sdk_identifier(),
            sdk_version: self.config.sdk_version(),
            location: location.or_else(|| self.dispatcher.latest_location()),
            progress: self.dispatcher.latest_progress(),
            phone: self.device.phone_state(),
            created: Utc::now(),
        }
    }
}

/// Telemetry coordinator for one navigation client
///
/// Constructed explicitly and passed to call sites; several instances may
/// coexist (tests do this).
pub struct TelemetryCoordinator {
    metrics: Arc<Metrics>,
    runtime: Mutex<Option<Arc<CoordinatorRuntime>>>,
}

impl TelemetryCoordinator {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics, runtime: Mutex::new(None) }
    }

    /// Start (or restart) telemetry with the `[device]` config as phone state
    pub fn initialize(
        &self,
        config: Config,
        reporter: Arc<dyn TelemetryReporter>,
    ) -> Result<(), TelemetryError> {
        let device = Arc::new(StaticDeviceState::new(config.static_phone_state()));
        self.initialize_with_device(config, reporter, device)
    }

    /// Start (or restart) telemetry. Must be called from within a tokio
    /// runtime. A previous runtime is shut down first, which emits Cancel
    /// for a started session before any new session can begin.
    pub fn initialize_with_device(
        &self,
        config: Config,
        reporter: Arc<dyn TelemetryReporter>,
        device: Arc<dyn DeviceStateProvider>,
    ) -> Result<(), TelemetryError> {
        let handle = Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;

        let mut slot = self.runtime.lock();
        if let Some(previous) = slot.take() {
            info!("coordinator_reinitializing");
            previous.shutdown();
        }

        let runtime =
            Arc::new(CoordinatorRuntime::new(config, handle, reporter, device, self.metrics.clone()));
        if runtime.config.send_turnstile() {
            runtime.spawn_turnstile();
        }
        info!(
            sdk = %runtime.config.sdk_identifier(),
            version = %runtime.config.sdk_version(),
            buffer_size = %runtime.config.location_buffer_size(),
            "coordinator_initialized"
        );
        *slot = Some(runtime);
        Ok(())
    }

    /// Stop telemetry. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let runtime = self.runtime.lock().take();
        match runtime {
            Some(runtime) => {
                runtime.shutdown();
                info!("coordinator_shutdown");
            }
            None => debug!("coordinator_shutdown_not_initialized"),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.lock().is_some()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    fn runtime(&self) -> Result<Arc<CoordinatorRuntime>, TelemetryError> {
        self.runtime.lock().clone().ok_or(TelemetryError::NotInitialized)
    }

    /// Copy of the current session record
    pub fn session_snapshot(&self) -> Result<SessionState, TelemetryError> {
        Ok(self.runtime()?.session.lock().clone())
    }

    pub fn on_location_changed(
        &self,
        raw: &Location,
        enhanced: Location,
        key_points: &[Location],
    ) -> Result<(), TelemetryError> {
        let runtime = self.runtime()?;
        trace!(key_points = %key_points.len(), "location_changed");
        runtime.dispatcher.on_raw_location(raw);
        runtime.dispatcher.on_enhanced_location(enhanced);
        Ok(())
    }

    pub fn on_routes_changed(&self, routes: Vec<Route>) -> Result<(), TelemetryError> {
        let runtime = self.runtime()?;
        debug!(routes = %routes.len(), "routes_changed");
        runtime.dispatcher.on_routes_changed(routes);
        Ok(())
    }

    pub fn on_route_progress_changed(&self, progress: RouteProgress) -> Result<(), TelemetryError> {
        self.runtime()?.dispatcher.on_route_progress(progress);
        Ok(())
    }

    pub fn on_off_route_state_changed(&self, off_route: bool) -> Result<(), TelemetryError> {
        let runtime = self.runtime()?;
        debug!(off_route = %off_route, "off_route_state_changed");
        runtime.dispatcher.on_off_route(off_route);
        Ok(())
    }

    /// Navigation session transitions, expected to be delivered serially
    pub fn on_session_state_changed(&self, state: NavigationState) -> Result<(), TelemetryError> {
        let runtime = self.runtime()?;
        let previous = std::mem::replace(&mut *runtime.nav_state.lock(), state);
        info!(from = %previous.as_str(), to = %state.as_str(), "navigation_state_changed");

        match state {
            NavigationState::Idle | NavigationState::FreeDrive => {
                let scope = runtime.scope.lock().take();
                if let Some(scope) = scope {
                    runtime.stop_session(scope);
                }
            }
            NavigationState::ActiveGuidance => runtime.start_session(),
        }
        Ok(())
    }

    /// Fire-and-forget. Dropped with a log line unless a session is active.
    pub fn post_user_feedback(&self, feedback: UserFeedback) {
        match self.runtime() {
            Ok(runtime) => runtime.post_feedback(feedback),
            Err(_) => {
                self.metrics.record_feedback_dropped();
                info!(feedback_type = %feedback.feedback_type, "feedback_before_initialize");
            }
        }
    }
}

impl Drop for TelemetryCoordinator {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown();
        }
    }
}
