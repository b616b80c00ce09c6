//! Recorded engine input replay
//!
//! Input is JSONL, one record per line, tagged by `type`:
//!
//! ```text
//! {"type":"routes","routes":[{"distance":1200.0,"duration":140.0}]}
//! {"type":"session_state","state":"active_guidance"}
//! {"type":"location","delay_ms":1000,"location":{"latitude":59.3,"longitude":18.0,"timestamp":1}}
//! {"type":"progress","progress":{"state":"location_tracking","distanceTraveled":10.0,"distanceRemaining":1190.0,"durationRemaining":139.0}}
//! {"type":"off_route","off_route":true}
//! {"type":"feedback","feedback":{"feedback_type":"road_closed","description":"closed"}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use crate::domain::event::AppMetadata;
use crate::domain::types::{Location, NavigationState, Route, RouteProgress, UserFeedback};
use crate::io::engine::ObserverHub;
use crate::services::coordinator::TelemetryCoordinator;
use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackInput {
    pub feedback_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_feedback_source")]
    pub source: String,
    /// Base64 encoded image
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub sub_types: Vec<String>,
    #[serde(default)]
    pub metadata: Option<AppMetadata>,
}

fn default_feedback_source() -> String {
    "user".to_string()
}

impl FeedbackInput {
    pub fn into_feedback(self) -> UserFeedback {
        let screenshot = self.screenshot.and_then(|encoded| match BASE64.decode(encoded.as_bytes()) {
            Ok(raw) => Some(Bytes::from(raw)),
            Err(e) => {
                warn!(error = %e, "replay_screenshot_invalid");
                None
            }
        });
        UserFeedback {
            feedback_type: self.feedback_type,
            description: self.description,
            source: self.source,
            screenshot,
            sub_types: self.sub_types,
            metadata: self.metadata,
        }
    }
}

/// One recorded engine callback
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineInput {
    SessionState { state: NavigationState },
    Routes { routes: Vec<Route> },
    Location { location: Location },
    Progress { progress: RouteProgress },
    OffRoute { off_route: bool },
    Feedback { feedback: FeedbackInput },
}

impl EngineInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineInput::SessionState { .. } => "session_state",
            EngineInput::Routes { .. } => "routes",
            EngineInput::Location { .. } => "location",
            EngineInput::Progress { .. } => "progress",
            EngineInput::OffRoute { .. } => "off_route",
            EngineInput::Feedback { .. } => "feedback",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
    /// Pause before delivering this record
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub input: EngineInput,
}

/// Parse JSONL replay records
pub fn parse_replay(content: &str) -> anyhow::Result<Vec<ReplayRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("Invalid replay record on line {}", i + 1))
        })
        .collect()
}

/// Read a JSONL replay file
pub fn read_replay<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<ReplayRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file {}", path.display()))?;
    parse_replay(&content)
}

/// Drives recorded inputs into the observer hub and the coordinator
pub struct Replayer {
    hub: Arc<ObserverHub>,
    coordinator: Arc<TelemetryCoordinator>,
}

impl Replayer {
    pub fn new(hub: Arc<ObserverHub>, coordinator: Arc<TelemetryCoordinator>) -> Self {
        Self { hub, coordinator }
    }

    /// Deliver every record in order. Returns how many were delivered
    /// before completion or cancellation.
    pub async fn run(&self, records: Vec<ReplayRecord>, shutdown: CancellationToken) -> usize {
        let total = records.len();
        let mut delivered = 0;
        for record in records {
            if record.delay_ms > 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(record.delay_ms)) => {}
                }
            } else if shutdown.is_cancelled() {
                break;
            }
            debug!(input = %record.input.as_str(), "replay_record");
            self.deliver(record.input);
            delivered += 1;
            // Let coordinator tasks observe each input before the next one
            tokio::task::yield_now().await;
        }
        info!(delivered = %delivered, total = %total, "replay_finished");
        delivered
    }

    fn deliver(&self, input: EngineInput) {
        match input {
            EngineInput::SessionState { state } => self.hub.publish_session_state(state),
            EngineInput::Routes { routes } => self.hub.publish_routes(&routes),
            EngineInput::Location { location } => {
                self.hub.publish_location(&location, &location, &[])
            }
            EngineInput::Progress { progress } => self.hub.publish_progress(&progress),
            EngineInput::OffRoute { off_route } => self.hub.publish_off_route(off_route),
            EngineInput::Feedback { feedback } => {
                self.coordinator.post_user_feedback(feedback.into_feedback())
            }
        }
    }
}
