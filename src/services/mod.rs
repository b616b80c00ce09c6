//! Services - telemetry coordination and state management
//!
//! This module contains the core telemetry logic:
//! - `coordinator` - Session lifecycle state machine and public API
//! - `dispatcher` - Landing point for engine callbacks
//! - `session` - Per-session state record
//! - `assembler` - Event payload assembly
//! - `metrics_gate` - Forwards events only while a session is active
//! - `capture_window` - Before/after location capture windows
//! - `ring_buffer` - Bounded recent-location history
//! - `mailbox` - Conflated single-slot channel
//! - `deferred` - Single-assignment value

pub mod assembler;
pub mod capture_window;
pub mod coordinator;
pub mod deferred;
pub mod dispatcher;
pub mod mailbox;
pub mod metrics_gate;
pub mod ring_buffer;
pub mod session;

// Re-export commonly used types
pub use coordinator::TelemetryCoordinator;
pub use dispatcher::SessionEventDispatcher;
pub use metrics_gate::MetricsGate;
pub use session::{SessionPhase, SessionState};
