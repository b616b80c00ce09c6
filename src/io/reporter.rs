//! Reporting sink seam
//!
//! The coordinator hands finished events to a `TelemetryReporter`. Calls
//! happen on coordinator tasks and engine callback threads, sometimes while
//! the session lock is held, so implementations must not block.

use crate::domain::event::TelemetryEvent;
use std::sync::Arc;

pub trait TelemetryReporter: Send + Sync {
    fn add_event(&self, event: TelemetryEvent);
}

/// Sends every event to each inner reporter in order
#[derive(Clone, Default)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn TelemetryReporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn TelemetryReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl TelemetryReporter for FanoutReporter {
    fn add_event(&self, event: TelemetryEvent) {
        let Some((last, rest)) = self.reporters.split_last() else {
            return;
        };
        for reporter in rest {
            reporter.add_event(event.clone());
        }
        last.add_event(event);
    }
}
