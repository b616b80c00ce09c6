//! Session start/monitor/stop sequences
//!
//! Every mutation of the session record re-checks the session token while
//! holding the session lock. The stop sequence cancels the token before it
//! takes the lock, so a task that lost the race never mutates a session
//! that was already stopped.

use super::{CoordinatorRuntime, SessionScope};
use crate::domain::event::{TelemetryEvent, UNKNOWN};
use crate::domain::types::{
    new_uuid_v7, FeedbackRouting, Location, Route, RouteProgress, RouteProgressState, UserFeedback,
};
use crate::services::assembler;
use crate::services::dispatcher::SessionDeferreds;
use crate::services::session::{SessionPhase, SessionState};
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Await `fut`, giving up after `limit` when one is set
async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

impl CoordinatorRuntime {
    /// One-shot app activation event, not session gated
    pub(super) fn spawn_turnstile(self: &Arc<Self>) {
        let runtime = self.clone();
        self.handle.spawn(async move {
            if runtime.root.is_cancelled() {
                return;
            }
            let phone = runtime.device.phone_state();
            let event = assembler::turnstile(
                runtime.config.sdk_identifier(),
                runtime.config.sdk_version(),
                runtime.config.user_id(),
                &phone,
                chrono::Utc::now(),
            );
            runtime.gate.emit_app_event(event);
            debug!("turnstile_sent");
        });
    }

    /// Handle a transition into active guidance
    pub(super) fn start_session(self: &Arc<Self>) {
        if !self.dispatcher.has_routes() {
            info!("active_guidance_without_route");
            return;
        }

        let previous = self.scope.lock().take();
        if let Some(previous) = previous {
            info!(generation = %previous.generation, "session_restarting");
            self.stop_session(previous);
        }

        self.dispatcher.reset_route_progress_processor();
        *self.feedback_routing.lock() = FeedbackRouting::Active;

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.root.child_token();
        let deferreds = self.dispatcher.begin_session();
        // A route seeded at the boundary starts the session before the
        // callback returns, so an immediate stop still cancels it
        let started = {
            let mut session = self.session.lock();
            session.phase = SessionPhase::AwaitingRoute;
            match deferreds.original_route.get() {
                Some(route) => {
                    self.mark_started(&mut session, route);
                    true
                }
                None => false,
            }
        };
        *self.scope.lock() = Some(SessionScope { generation, token: token.clone() });

        debug!(generation = %generation, started = %started, "session_scope_opened");
        self.handle.spawn(self.clone().monitor(token.clone()));
        self.handle.spawn(self.clone().run_session(token, deferreds, started));
    }

    fn mark_started(&self, session: &mut SessionState, route: Route) {
        session.start(route);
        self.metrics.record_session_started();
        info!(
            session_id = %session.session_id,
            trip_id = %session.trip_id,
            route_distance = %session.distance_remaining,
            "session_started"
        );
        // Anything already queued belongs to the original route, not a reroute
        self.dispatcher.route_mailbox().try_recv();
    }

    async fn run_session(
        self: Arc<Self>,
        token: CancellationToken,
        deferreds: SessionDeferreds,
        started: bool,
    ) {
        if !started {
            let route = tokio::select! {
                _ = token.cancelled() => {
                    debug!(stage = "original_route", "session_wait_cancelled");
                    return;
                }
                route = deferreds.original_route.wait() => route,
            };
            let mut session = self.session.lock();
            if token.is_cancelled() {
                return;
            }
            self.mark_started(&mut session, route);
        }

        let first_location = tokio::select! {
            _ = token.cancelled() => {
                debug!(stage = "first_location", "session_wait_cancelled");
                return;
            }
            location = deferreds.first_location.wait() => location,
        };

        {
            let mut session = self.session.lock();
            if token.is_cancelled() {
                return;
            }
            let event = assembler::depart(&self.context(&session, Some(first_location)));
            self.gate.emit(&session, event);
            session.phase = SessionPhase::Monitoring;
            debug!(session_id = %session.session_id, "session_monitoring");
        }

        self.handle.spawn(self.clone().watch_off_route(token));
    }

    /// Progress consumer for one session scope. Runs from session start so
    /// out-of-order samples are seen before the session departs.
    async fn monitor(self: Arc<Self>, token: CancellationToken) {
        loop {
            let progress = tokio::select! {
                _ = token.cancelled() => break,
                received = self.dispatcher.progress_mailbox().recv() => match received {
                    Ok(progress) => progress,
                    Err(e) => {
                        info!(error = %e, "progress_channel_closed");
                        break;
                    }
                },
            };
            if !self.process_progress(&token, progress) {
                break;
            }
        }
        debug!("monitoring_stopped");
    }

    /// Apply one progress sample. Returns false when monitoring should end.
    fn process_progress(&self, token: &CancellationToken, progress: RouteProgress) -> bool {
        let mut session = self.session.lock();
        if token.is_cancelled() {
            return false;
        }
        if progress.state == RouteProgressState::RouteComplete
            && session.phase != SessionPhase::Monitoring
        {
            warn!(
                started = %session.started,
                phase = %session.phase.as_str(),
                "arrival_before_session_start"
            );
            drop(session);
            // Keep listening for the arrival that follows departure
            self.dispatcher.reset_route_progress_processor();
            return true;
        }
        if !session.started {
            return true;
        }
        session.apply_progress(&progress);

        match progress.state {
            RouteProgressState::RouteComplete => {
                if !session.mark_arrived() {
                    return false;
                }
                session.refresh_remaining(&progress);
                let event = assembler::arrive(&self.context(&session, None));
                self.gate.emit(&session, event);
                info!(
                    session_id = %session.session_id,
                    trip_id = %session.trip_id,
                    distance_completed = %session.distance_completed,
                    reroutes = %session.reroute_count,
                    "session_arrived"
                );
                session.rotate_trip_id();
                drop(session);

                self.flush_windows();
                self.dispatcher.clear_original_route();
                false
            }
            RouteProgressState::LocationTracking => {
                session.refresh_remaining(&progress);
                session.heartbeat_count += 1;
                if session.heartbeat_count % self.config.heartbeat_log_every() == 0 {
                    debug!(
                        session_id = %session.session_id,
                        heartbeat = %session.heartbeat_count,
                        distance_completed = %session.distance_completed,
                        distance_remaining = %session.distance_remaining,
                        "session_heartbeat"
                    );
                }
                true
            }
            _ => true,
        }
    }

    async fn watch_off_route(self: Arc<Self>, token: CancellationToken) {
        loop {
            let off_route = tokio::select! {
                _ = token.cancelled() => return,
                received = self.dispatcher.off_route_mailbox().recv() => match received {
                    Ok(off_route) => off_route,
                    Err(_) => return,
                },
            };
            if !off_route {
                continue;
            }

            let since = {
                let mut session = self.session.lock();
                if token.is_cancelled() || session.phase != SessionPhase::Monitoring {
                    debug!(phase = %session.phase.as_str(), "off_route_ignored");
                    continue;
                }
                let since = session.record_reroute();
                info!(
                    session_id = %session.session_id,
                    reroute_count = %session.reroute_count,
                    "off_route_detected"
                );
                since
            };
            self.metrics.record_reroute();
            self.handle.spawn(self.clone().await_reroute(token.clone(), since));
        }
    }

    /// Wait for the replacement route of one deviation
    async fn await_reroute(self: Arc<Self>, token: CancellationToken, since: Option<Duration>) {
        let limit = self.config.reroute_timeout();
        let received = tokio::select! {
            _ = token.cancelled() => {
                debug!("reroute_wait_cancelled");
                return;
            }
            received = with_timeout(limit, self.dispatcher.route_mailbox().recv()) => received,
        };

        match received {
            Some(Ok(route)) => self.register_reroute(&token, route, since),
            Some(Err(e)) => debug!(error = %e, "reroute_route_channel_closed"),
            None => {
                self.metrics.record_reroute_timeout();
                warn!(
                    timeout_secs = %limit.map(|d| d.as_secs()).unwrap_or_default(),
                    "reroute_route_timeout"
                );
            }
        }
    }

    fn register_reroute(&self, token: &CancellationToken, route: Route, since: Option<Duration>) {
        let mut session = self.session.lock();
        if token.is_cancelled() || !session.started || session.terminated {
            debug!("reroute_after_session_end");
            return;
        }

        let seconds_since = since.map(|d| d.as_secs() as i64).unwrap_or(UNKNOWN as i64);
        session.apply_reroute(route.clone());
        let mut event = assembler::reroute(
            &self.context(&session, None),
            &route,
            seconds_since,
            new_uuid_v7(),
        );

        let gate = self.gate.clone();
        let shared = self.session.clone();
        let owner = session.session_id.clone();
        let window = self.dispatcher.windows().register(
            self.dispatcher.location_snapshot(),
            Box::new(move |before: Vec<Location>, after: Vec<Location>| {
                event.locations_before = before;
                event.locations_after = after;
                let session = shared.lock();
                gate.emit_captured(&owner, &session, TelemetryEvent::Reroute(event));
            }),
        );
        info!(
            session_id = %session.session_id,
            window_id = %window,
            new_distance = %route.distance,
            seconds_since_last = %seconds_since,
            "reroute_capture_started"
        );
    }

    pub(super) fn post_feedback(&self, feedback: UserFeedback) {
        let routing = *self.feedback_routing.lock();
        if routing == FeedbackRouting::Inactive {
            self.metrics.record_feedback_dropped();
            info!(feedback_type = %feedback.feedback_type, "feedback_dropped_inactive");
            return;
        }

        let session = self.session.lock();
        if !session.is_available() {
            self.metrics.record_feedback_dropped();
            info!(
                feedback_type = %feedback.feedback_type,
                route_present = %session.original_route.is_some(),
                started = %session.started,
                "feedback_dropped_session_unavailable"
            );
            return;
        }

        let mut event = assembler::feedback(
            &self.context(&session, None),
            &feedback,
            self.config.user_id(),
            new_uuid_v7(),
        );
        let feedback_id = event.feedback_id.clone();

        let gate = self.gate.clone();
        let shared = self.session.clone();
        let owner = session.session_id.clone();
        self.dispatcher.windows().register(
            self.dispatcher.location_snapshot(),
            Box::new(move |before: Vec<Location>, after: Vec<Location>| {
                event.locations_before = before;
                event.locations_after = after;
                let session = shared.lock();
                gate.emit_captured(&owner, &session, TelemetryEvent::Feedback(event));
            }),
        );
        info!(
            session_id = %session.session_id,
            feedback_id = %feedback_id,
            feedback_type = %feedback.feedback_type,
            "feedback_capture_started"
        );
    }

    fn flush_windows(&self) {
        let flushed = self.dispatcher.windows().flush_all();
        if flushed > 0 {
            self.metrics.record_windows_flushed(flushed as u64);
        }
    }

    /// Stop sequence: cancel the scope, emit Cancel unless the session
    /// already arrived, flush capture windows, reset for the next session
    pub(super) fn stop_session(&self, scope: SessionScope) {
        scope.token.cancel();
        *self.feedback_routing.lock() = FeedbackRouting::Inactive;

        {
            let mut session = self.session.lock();
            if session.route_arrived {
                debug!(session_id = %session.session_id, "session_already_arrived");
            } else if session.begin_cancel() {
                let event = assembler::cancel(&self.context(&session, None));
                self.gate.emit(&session, event);
                info!(
                    session_id = %session.session_id,
                    distance_completed = %session.distance_completed,
                    reroutes = %session.reroute_count,
                    "session_cancelled"
                );
            } else {
                debug!(phase = %session.phase.as_str(), "session_stopped_before_start");
            }
        }

        self.flush_windows();
        self.session.lock().reset();
        self.dispatcher.clear_original_route();
        self.dispatcher.rearm_first_location();
        info!(generation = %scope.generation, "session_stopped");
    }

    /// End of the `initialize`..`shutdown` bracket
    pub(super) fn shutdown(&self) {
        let scope = self.scope.lock().take();
        if let Some(scope) = scope {
            self.stop_session(scope);
        }
        self.root.cancel();
        self.dispatcher.close();
    }
}
