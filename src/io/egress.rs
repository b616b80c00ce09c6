//! Event egress - writes analytics events to file
//!
//! Events are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::event::TelemetryEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Egress writer for analytics events
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write an event to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_event(&self, event: &TelemetryEvent) -> bool {
        let json = event.to_json();

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    event = %event.kind().as_str(),
                    session_id = %event.session_id().unwrap_or("-"),
                    "event_egressed"
                );
                true
            }
            Err(e) => {
                error!(event = %event.kind().as_str(), error = %e, "event_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }

    /// Write multiple events, returns how many succeeded
    pub fn write_events(&self, events: &[TelemetryEvent]) -> usize {
        events.iter().filter(|event| self.write_event(event)).count()
    }

    /// Drain the channel until every sender is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<TelemetryEvent>) -> usize {
        let mut written = 0;
        while let Some(event) = rx.recv().await {
            if self.write_event(&event) {
                written += 1;
            }
        }
        info!(written = %written, "egress_stopped");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{TurnstileEvent, EVENT_VERSION};
    use std::fs;
    use tempfile::tempdir;

    fn event(user: &str) -> TelemetryEvent {
        TelemetryEvent::Turnstile(TurnstileEvent {
            created: "2026-01-01T00:00:00.000Z".to_string(),
            user_id: user.to_string(),
            enabled_telemetry: true,
            device: "d".to_string(),
            operating_system: "os".to_string(),
            sdk_identifier: "nav-telemetry".to_string(),
            sdk_version: "0.1.0".to_string(),
            event_version: EVENT_VERSION,
        })
    }

    #[test]
    fn test_write_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        assert!(egress.write_event(&event("u-1")));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["event"], "appUserTurnstile");
        assert_eq!(parsed["userId"], "u-1");
    }

    #[test]
    fn test_append_mode_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("nested").join("events.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let count = egress.write_events(&[event("a"), event("b"), event("c")]);
        assert_eq!(count, 3);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let parsed: TelemetryEvent = serde_json::from_str(line).unwrap();
            assert!(parsed.session_id().is_none());
        }
    }

    #[tokio::test]
    async fn test_run_drains_until_senders_drop() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let (tx, rx) = mpsc::channel(8);
        tx.send(event("a")).await.unwrap();
        tx.send(event("b")).await.unwrap();
        drop(tx);

        assert_eq!(egress.run(rx).await, 2);
    }
}
