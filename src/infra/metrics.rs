//! Lock-free telemetry counters and periodic reporting
//!
//! Uses atomics so the engine callback threads never contend on a mutex.
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::event::EventKind;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

const NUM_KINDS: usize = 6;

#[inline]
fn kind_index(kind: EventKind) -> usize {
    match kind {
        EventKind::Depart => 0,
        EventKind::Arrive => 1,
        EventKind::Cancel => 2,
        EventKind::Reroute => 3,
        EventKind::Feedback => 4,
        EventKind::Turnstile => 5,
    }
}

/// Lock-free counters for the telemetry pipeline
#[derive(Default)]
pub struct Metrics {
    /// Events handed to the reporter, per kind
    emitted: [AtomicU64; NUM_KINDS],
    /// Events dropped because no session was active
    gate_dropped: AtomicU64,
    /// Events dropped because the egress channel was full
    egress_dropped: AtomicU64,
    sessions_started: AtomicU64,
    reroutes: AtomicU64,
    reroute_timeouts: AtomicU64,
    windows_completed: AtomicU64,
    windows_flushed: AtomicU64,
    feedback_dropped: AtomicU64,
    location_updates: AtomicU64,
    progress_updates: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_emitted(&self, kind: EventKind) {
        self.emitted[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gate_dropped(&self) {
        self.gate_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reroute(&self) {
        self.reroutes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reroute_timeout(&self) {
        self.reroute_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_windows_completed(&self, count: u64) {
        self.windows_completed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_windows_flushed(&self, count: u64) {
        self.windows_flushed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feedback_dropped(&self) {
        self.feedback_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_update(&self) {
        self.location_updates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_progress_update(&self) {
        self.progress_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn emitted(&self, kind: EventKind) -> u64 {
        self.emitted[kind_index(kind)].load(Ordering::Relaxed)
    }

    pub fn gate_dropped(&self) -> u64 {
        self.gate_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters (monotonic, never reset)
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            depart: self.emitted(EventKind::Depart),
            arrive: self.emitted(EventKind::Arrive),
            cancel: self.emitted(EventKind::Cancel),
            reroute: self.emitted(EventKind::Reroute),
            feedback: self.emitted(EventKind::Feedback),
            turnstile: self.emitted(EventKind::Turnstile),
            gate_dropped: self.gate_dropped(),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            reroutes: self.reroutes.load(Ordering::Relaxed),
            reroute_timeouts: self.reroute_timeouts.load(Ordering::Relaxed),
            windows_completed: self.windows_completed.load(Ordering::Relaxed),
            windows_flushed: self.windows_flushed.load(Ordering::Relaxed),
            feedback_dropped: self.feedback_dropped.load(Ordering::Relaxed),
            location_updates: self.location_updates.load(Ordering::Relaxed),
            progress_updates: self.progress_updates.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub depart: u64,
    pub arrive: u64,
    pub cancel: u64,
    pub reroute: u64,
    pub feedback: u64,
    pub turnstile: u64,
    pub gate_dropped: u64,
    pub egress_dropped: u64,
    pub sessions_started: u64,
    pub reroutes: u64,
    pub reroute_timeouts: u64,
    pub windows_completed: u64,
    pub windows_flushed: u64,
    pub feedback_dropped: u64,
    pub location_updates: u64,
    pub progress_updates: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            depart = %self.depart,
            arrive = %self.arrive,
            cancel = %self.cancel,
            reroute = %self.reroute,
            feedback = %self.feedback,
            turnstile = %self.turnstile,
            gate_dropped = %self.gate_dropped,
            egress_dropped = %self.egress_dropped,
            sessions_started = %self.sessions_started,
            reroutes = %self.reroutes,
            reroute_timeouts = %self.reroute_timeouts,
            windows_completed = %self.windows_completed,
            windows_flushed = %self.windows_flushed,
            feedback_dropped = %self.feedback_dropped,
            location_updates = %self.location_updates,
            progress_updates = %self.progress_updates,
            "telemetry_metrics"
        );
    }
}
