//! Tests for the telemetry coordinator

use super::*;
use crate::domain::event::{EventKind, TelemetryEvent};
use crate::domain::types::{Point, RouteLeg, RouteProgressState, RouteStep};
use crate::services::session::SessionPhase;
use tokio::time::{sleep, Duration, Instant};

/// Reporter that keeps every event it receives
#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl TelemetryReporter for RecordingReporter {
    fn add_event(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

impl RecordingReporter {
    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }

    fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    fn last(&self, kind: EventKind) -> Option<TelemetryEvent> {
        self.events.lock().iter().rev().find(|e| e.kind() == kind).cloned()
    }
}

/// Coordinator plus the reporter it writes to
struct TestCoordinator {
    coordinator: TelemetryCoordinator,
    reporter: Arc<RecordingReporter>,
}

impl std::ops::Deref for TestCoordinator {
    type Target = TelemetryCoordinator;
    fn deref(&self) -> &Self::Target {
        &self.coordinator
    }
}

fn test_config() -> Config {
    Config::default().with_location_buffer_size(3).with_send_turnstile(false)
}

fn create_test_coordinator() -> TestCoordinator {
    create_test_coordinator_with_config(test_config())
}

fn create_test_coordinator_with_config(config: Config) -> TestCoordinator {
    let reporter = Arc::new(RecordingReporter::default());
    let coordinator = TelemetryCoordinator::new(Arc::new(Metrics::new()));
    coordinator.initialize(config, reporter.clone()).unwrap();
    TestCoordinator { coordinator, reporter }
}

fn route(request_id: &str, distance: f64) -> Route {
    Route {
        request_id: Some(request_id.to_string()),
        geometry: format!("geom-{request_id}"),
        distance,
        duration: distance / 10.0,
        profile: "driving-traffic".to_string(),
        legs: vec![RouteLeg { steps: vec![RouteStep { distance, duration: distance / 10.0 }] }],
        destination: Some(Point::new(0.0, 0.01)),
    }
}

fn progress(state: RouteProgressState, traveled: f64, remaining: f64) -> RouteProgress {
    RouteProgress {
        state,
        distance_traveled: traveled,
        distance_remaining: remaining,
        duration_remaining: remaining / 10.0,
        leg_index: 0,
        step_index: 0,
    }
}

fn location(ts: u64) -> Location {
    Location::new(0.0, ts as f64 * 0.0001, ts)
}

fn push_location(c: &TelemetryCoordinator, ts: u64) {
    let fix = location(ts);
    c.on_location_changed(&fix, fix.clone(), &[]).unwrap();
}

/// Poll until `check` holds or a second elapses
async fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    check()
}

fn phase(c: &TelemetryCoordinator) -> SessionPhase {
    c.session_snapshot().unwrap().phase
}

/// Drive a session up to MONITORING with the Depart emitted
async fn start_monitoring(c: &TestCoordinator) {
    c.on_routes_changed(vec![route("orig", 1000.0)]).unwrap();
    c.on_session_state_changed(NavigationState::ActiveGuidance).unwrap();
    push_location(c, 1);
    assert!(eventually(|| phase(c) == SessionPhase::Monitoring).await);
    assert_eq!(c.reporter.count(EventKind::Depart), 1);
}

#[tokio::test]
async fn test_active_guidance_without_route_stays_idle() {
    let c = create_test_coordinator();
    c.on_session_state_changed(NavigationState::ActiveGuidance).unwrap();
    push_location(&c, 1);
    sleep(Duration::from_millis(20)).await;

    assert_eq!(phase(&c), SessionPhase::Inactive);
    assert!(c.reporter.kinds().is_empty());
}

#[tokio::test]
async fn test_depart_waits_for_first_location() {
    let c = create_test_coordinator();
    c.on_routes_changed(vec![route("orig", 1000.0)]).unwrap();
    c.on_session_state_changed(NavigationState::ActiveGuidance).unwrap();

    assert!(eventually(|| phase(&c) == SessionPhase::Started).await);
    assert_eq!(c.reporter.count(EventKind::Depart), 0);

    push_location(&c, 7);
    assert!(eventually(|| c.reporter.count(EventKind::Depart) == 1).await);

    let Some(TelemetryEvent::Depart(depart)) = c.reporter.last(EventKind::Depart) else {
        panic!("expected depart");
    };
    assert_eq!(depart.envelope.lng, location(7).longitude);
    assert_eq!(depart.envelope.original_request_identifier.as_deref(), Some("orig"));
    assert!(depart.envelope.start_timestamp.is_some());
}

#[tokio::test]
async fn test_arrival_emits_arrive_and_no_cancel() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;
    let trip_before = c.session_snapshot().unwrap().trip_id;

    c.on_route_progress_changed(progress(RouteProgressState::RouteComplete, 1000.0, 0.0)).unwrap();
    assert!(eventually(|| c.reporter.count(EventKind::Arrive) == 1).await);

    let snapshot = c.session_snapshot().unwrap();
    assert!(snapshot.route_arrived);
    assert_ne!(snapshot.trip_id, trip_before);

    c.on_session_state_changed(NavigationState::FreeDrive).unwrap();
    assert_eq!(c.reporter.count(EventKind::Arrive), 1);
    assert_eq!(c.reporter.count(EventKind::Cancel), 0);

    let Some(TelemetryEvent::Arrive(arrive)) = c.reporter.last(EventKind::Arrive) else {
        panic!("expected arrive");
    };
    assert_eq!(arrive.envelope.trip_identifier, trip_before);
    assert_eq!(arrive.envelope.percent_distance_traveled, 100.0);
}

#[tokio::test]
async fn test_route_complete_is_processed_once() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;

    c.on_route_progress_changed(progress(RouteProgressState::RouteComplete, 1000.0, 0.0)).unwrap();
    sleep(Duration::from_millis(20)).await;
    c.on_route_progress_changed(progress(RouteProgressState::RouteComplete, 1000.0, 0.0)).unwrap();
    sleep(Duration::from_millis(20)).await;

    assert_eq!(c.reporter.count(EventKind::Arrive), 1);
}

#[tokio::test]
async fn test_free_drive_before_completion_emits_cancel() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;
    c.on_route_progress_changed(progress(RouteProgressState::LocationTracking, 300.0, 700.0))
        .unwrap();
    assert!(eventually(|| c.session_snapshot().unwrap().distance_completed == 300.0).await);

    c.on_session_state_changed(NavigationState::FreeDrive).unwrap();

    assert_eq!(c.reporter.count(EventKind::Cancel), 1);
    assert_eq!(c.reporter.count(EventKind::Arrive), 0);
    let Some(TelemetryEvent::Cancel(cancel)) = c.reporter.last(EventKind::Cancel) else {
        panic!("expected cancel");
    };
    assert_eq!(cancel.envelope.distance_completed, 300.0);
    assert!(cancel.arrival_timestamp.is_none());

    // State was reset for the next session
    let snapshot = c.session_snapshot().unwrap();
    assert!(!snapshot.started);
    assert_eq!(snapshot.phase, SessionPhase::Inactive);
}

#[tokio::test]
async fn test_stop_before_depart_still_cancels() {
    let c = create_test_coordinator();
    // Routes known, but the session never gets a first location
    c.on_routes_changed(vec![route("orig", 1000.0)]).unwrap();
    c.on_session_state_changed(NavigationState::ActiveGuidance).unwrap();
    assert!(eventually(|| phase(&c) == SessionPhase::Started).await);

    c.on_session_state_changed(NavigationState::Idle).unwrap();
    // Started but never departed: a cancel still closes the session
    assert_eq!(c.reporter.count(EventKind::Cancel), 1);
    assert_eq!(c.reporter.count(EventKind::Depart), 0);

    // Idle again is a no-op
    c.on_session_state_changed(NavigationState::Idle).unwrap();
    assert_eq!(c.reporter.kinds().len(), 1);
}

#[tokio::test]
async fn test_idle_without_session_is_noop() {
    let c = create_test_coordinator();
    c.on_session_state_changed(NavigationState::FreeDrive).unwrap();
    c.on_session_state_changed(NavigationState::Idle).unwrap();
    assert!(c.reporter.kinds().is_empty());
}

#[tokio::test]
async fn test_two_reroutes_produce_two_events() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;

    for (i, id) in ["r1", "r2"].iter().enumerate() {
        c.on_off_route_state_changed(true).unwrap();
        assert!(eventually(|| c.session_snapshot().unwrap().reroute_count == i as u32 + 1).await);
        c.on_routes_changed(vec![route(id, 800.0)]).unwrap();
        let expected = i + 1;
        assert!(eventually(|| c.dispatcher_windows_in_flight() == 1).await);
        c.on_off_route_state_changed(false).unwrap();
        for ts in 0..3 {
            push_location(&c, 10 * (i as u64 + 1) + ts);
        }
        assert!(eventually(|| c.reporter.count(EventKind::Reroute) == expected).await);
    }

    let events = c.reporter.events.lock().clone();
    let reroutes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TelemetryEvent::Reroute(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(reroutes.len(), 2);
    assert_eq!(reroutes[0].seconds_since_last_reroute, -1);
    assert!(reroutes[1].seconds_since_last_reroute >= 0);
    assert_eq!(reroutes[1].envelope.reroute_count, 2);
    for reroute in reroutes {
        assert!(reroute.locations_before.len() <= 3);
        assert_eq!(reroute.locations_after.len(), 3);
        assert_eq!(reroute.new_distance_remaining, 800.0);
    }
    assert_eq!(c.session_snapshot().unwrap().reroute_count, 2);
}

#[tokio::test]
async fn test_distance_completed_survives_reroute() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;
    c.on_route_progress_changed(progress(RouteProgressState::LocationTracking, 400.0, 600.0))
        .unwrap();
    assert!(eventually(|| c.session_snapshot().unwrap().distance_completed == 400.0).await);

    c.on_off_route_state_changed(true).unwrap();
    assert!(eventually(|| c.session_snapshot().unwrap().reroute_count == 1).await);
    c.on_routes_changed(vec![route("r1", 900.0)]).unwrap();
    assert!(eventually(|| c.dispatcher_windows_in_flight() == 1).await);

    c.on_route_progress_changed(progress(RouteProgressState::LocationTracking, 100.0, 800.0))
        .unwrap();
    assert!(eventually(|| c.session_snapshot().unwrap().distance_completed == 500.0).await);
}

#[tokio::test]
async fn test_reroute_wait_times_out() {
    let c = create_test_coordinator_with_config(test_config().with_reroute_timeout_secs(1));
    start_monitoring(&c).await;

    c.on_off_route_state_changed(true).unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while c.metrics().report().reroute_timeouts == 0 && Instant::now() < deadline {
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(c.metrics().report().reroute_timeouts, 1);
    assert_eq!(c.dispatcher_windows_in_flight(), 0);
}

#[tokio::test]
async fn test_feedback_before_active_never_reaches_reporter() {
    let c = create_test_coordinator();
    c.post_user_feedback(UserFeedback::new("incorrect_visual", "arrow points wrong way"));
    for ts in 0..5 {
        push_location(&c, ts);
    }
    sleep(Duration::from_millis(20)).await;

    assert!(c.reporter.kinds().is_empty());
    assert_eq!(c.metrics().report().feedback_dropped, 1);
}

#[tokio::test]
async fn test_feedback_before_initialize_is_dropped() {
    let coordinator = TelemetryCoordinator::new(Arc::new(Metrics::new()));
    coordinator.post_user_feedback(UserFeedback::new("other", "early"));
    assert_eq!(coordinator.metrics().report().feedback_dropped, 1);
}

#[tokio::test]
async fn test_active_feedback_flushed_on_stop() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;

    c.post_user_feedback(UserFeedback::new("road_closed", "closed"));
    assert_eq!(c.dispatcher_windows_in_flight(), 1);
    push_location(&c, 2);

    c.on_session_state_changed(NavigationState::FreeDrive).unwrap();
    assert_eq!(c.reporter.kinds(), vec![EventKind::Depart, EventKind::Cancel, EventKind::Feedback]);

    let Some(TelemetryEvent::Feedback(feedback)) = c.reporter.last(EventKind::Feedback) else {
        panic!("expected feedback");
    };
    assert_eq!(feedback.locations_after.len(), 1);
    assert_eq!(feedback.feedback_type, "road_closed");
    assert_eq!(c.metrics().report().windows_flushed, 1);
}

#[tokio::test]
async fn test_reinitialize_cancels_monitoring_session() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;

    let fresh = Arc::new(RecordingReporter::default());
    c.initialize(test_config(), fresh.clone()).unwrap();

    assert_eq!(c.reporter.kinds(), vec![EventKind::Depart, EventKind::Cancel]);
    assert!(fresh.kinds().is_empty());
    assert_eq!(phase(&c), SessionPhase::Inactive);
}

#[tokio::test]
async fn test_repeated_active_guidance_restarts_session() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;
    let first_session = c.session_snapshot().unwrap().session_id;

    c.on_session_state_changed(NavigationState::ActiveGuidance).unwrap();
    push_location(&c, 2);
    assert!(eventually(|| c.reporter.count(EventKind::Depart) == 2).await);

    assert_eq!(c.reporter.count(EventKind::Cancel), 1);
    assert_ne!(c.session_snapshot().unwrap().session_id, first_session);
}

#[tokio::test]
async fn test_calls_after_shutdown_fail_not_initialized() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;
    c.shutdown();

    assert_eq!(c.reporter.count(EventKind::Cancel), 1);
    assert_eq!(
        c.on_session_state_changed(NavigationState::Idle),
        Err(TelemetryError::NotInitialized)
    );
    assert_eq!(c.on_off_route_state_changed(true), Err(TelemetryError::NotInitialized));
    assert!(!c.is_initialized());
    c.shutdown();
}

#[tokio::test]
async fn test_turnstile_sent_on_initialize() {
    let c = create_test_coordinator_with_config(test_config().with_send_turnstile(true));
    assert!(eventually(|| c.reporter.count(EventKind::Turnstile) == 1).await);
    assert_eq!(c.metrics().report().gate_dropped, 0);
}

#[tokio::test]
async fn test_closed_progress_channel_ends_monitoring_quietly() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;

    c.runtime().unwrap().dispatcher.progress_mailbox().close();
    sleep(Duration::from_millis(20)).await;
    // Offers after close are discarded, nothing reaches the monitor
    c.on_route_progress_changed(progress(RouteProgressState::RouteComplete, 1000.0, 0.0)).unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(c.reporter.kinds(), vec![EventKind::Depart]);

    c.on_session_state_changed(NavigationState::FreeDrive).unwrap();
    assert_eq!(c.reporter.kinds(), vec![EventKind::Depart, EventKind::Cancel]);
}

#[tokio::test]
async fn test_stop_cancels_pending_reroute_wait() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;

    c.on_off_route_state_changed(true).unwrap();
    assert!(eventually(|| c.session_snapshot().unwrap().reroute_count == 1).await);
    c.on_session_state_changed(NavigationState::FreeDrive).unwrap();

    // Replacement route shows up after the session is gone
    c.on_routes_changed(vec![route("r1", 900.0)]).unwrap();
    for ts in 2..6 {
        push_location(&c, ts);
    }
    sleep(Duration::from_millis(20)).await;

    assert_eq!(c.reporter.count(EventKind::Reroute), 0);
    assert_eq!(c.dispatcher_windows_in_flight(), 0);
    assert_eq!(c.reporter.count(EventKind::Cancel), 1);
}

#[tokio::test]
async fn test_route_complete_before_depart_is_ignored() {
    let c = create_test_coordinator();
    c.on_routes_changed(vec![route("orig", 1000.0)]).unwrap();
    c.on_session_state_changed(NavigationState::ActiveGuidance).unwrap();
    c.on_route_progress_changed(progress(RouteProgressState::RouteComplete, 1000.0, 0.0)).unwrap();
    sleep(Duration::from_millis(20)).await;
    assert!(c.reporter.kinds().is_empty());

    push_location(&c, 1);
    assert!(eventually(|| phase(&c) == SessionPhase::Monitoring).await);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(c.reporter.kinds(), vec![EventKind::Depart]);

    // The arrival that follows departure is still taken
    c.on_route_progress_changed(progress(RouteProgressState::RouteComplete, 1000.0, 0.0)).unwrap();
    assert!(eventually(|| c.reporter.count(EventKind::Arrive) == 1).await);
    assert_eq!(c.reporter.count(EventKind::Cancel), 0);
}

#[tokio::test]
async fn test_back_to_back_off_route_signals_conflate() {
    let c = create_test_coordinator();
    start_monitoring(&c).await;

    // No consumer poll in between: the mailbox keeps only the latest signal
    c.on_off_route_state_changed(true).unwrap();
    c.on_off_route_state_changed(true).unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(c.session_snapshot().unwrap().reroute_count, 1);

    c.on_off_route_state_changed(true).unwrap();
    assert!(eventually(|| c.session_snapshot().unwrap().reroute_count == 2).await);
}

#[tokio::test]
async fn test_free_drive_right_after_active_guidance_cancels() {
    let c = create_test_coordinator();
    c.on_routes_changed(vec![route("orig", 1000.0)]).unwrap();
    push_location(&c, 1);

    // No await between the two transitions
    c.on_session_state_changed(NavigationState::ActiveGuidance).unwrap();
    assert_eq!(phase(&c), SessionPhase::Started);
    c.on_session_state_changed(NavigationState::FreeDrive).unwrap();
    assert_eq!(c.reporter.kinds(), vec![EventKind::Cancel]);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(c.reporter.kinds(), vec![EventKind::Cancel]);
    assert_eq!(c.metrics().report().sessions_started, 1);
}

#[test]
fn test_initialize_outside_runtime_fails() {
    let coordinator = TelemetryCoordinator::new(Arc::new(Metrics::new()));
    let result = coordinator.initialize(test_config(), Arc::new(RecordingReporter::default()));
    assert_eq!(result, Err(TelemetryError::NoRuntime));
}

impl TelemetryCoordinator {
    fn dispatcher_windows_in_flight(&self) -> usize {
        self.runtime().map(|r| r.dispatcher.windows().in_flight()).unwrap_or(0)
    }
}
