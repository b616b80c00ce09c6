//! Metrics gate
//!
//! Forwards session events to the reporter only while the session is
//! verifiably active. Dropping is silent to the caller.

use crate::domain::event::TelemetryEvent;
use crate::infra::metrics::Metrics;
use crate::io::reporter::TelemetryReporter;
use crate::services::session::SessionState;
use std::sync::Arc;
use tracing::{debug, info};

pub struct MetricsGate {
    reporter: Arc<dyn TelemetryReporter>,
    metrics: Arc<Metrics>,
}

impl MetricsGate {
    pub fn new(reporter: Arc<dyn TelemetryReporter>, metrics: Arc<Metrics>) -> Self {
        Self { reporter, metrics }
    }

    pub fn is_available(session: &SessionState) -> bool {
        session.is_available()
    }

    /// Forward a session event. Returns false if it was dropped.
    pub fn emit(&self, session: &SessionState, event: TelemetryEvent) -> bool {
        let kind = event.kind();
        if !Self::is_available(session) {
            self.metrics.record_gate_dropped();
            info!(
                event = %kind.as_str(),
                route_present = %session.original_route.is_some(),
                started = %session.started,
                "event_dropped_gate_closed"
            );
            return false;
        }

        debug!(event = %kind.as_str(), session_id = %session.session_id, "event_emitted");
        self.metrics.record_emitted(kind);
        self.reporter.add_event(event);
        true
    }

    /// Forward an event captured on behalf of session `owner`.
    ///
    /// Availability is checked against the owning session. A capture window
    /// only opens while its session is available, so once that session has
    /// been reset the event goes out on the decision made at capture time.
    pub fn emit_captured(
        &self,
        owner: &str,
        session: &SessionState,
        event: TelemetryEvent,
    ) -> bool {
        if session.session_id == owner {
            return self.emit(session, event);
        }
        let kind = event.kind();
        debug!(event = %kind.as_str(), session_id = %owner, "captured_event_outlived_session");
        self.metrics.record_emitted(kind);
        self.reporter.add_event(event);
        true
    }

    /// Forward an app-level event that is not tied to a session
    pub fn emit_app_event(&self, event: TelemetryEvent) {
        let kind = event.kind();
        debug!(event = %kind.as_str(), "app_event_emitted");
        self.metrics.record_emitted(kind);
        self.reporter.add_event(event);
    }
}
