//! Error type for the telemetry library surface

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// Coordinator used before `initialize` or after `shutdown`
    #[error("telemetry coordinator is not initialized")]
    NotInitialized,
    /// `initialize` was called outside a tokio runtime
    #[error("no tokio runtime available to run telemetry tasks")]
    NoRuntime,
    /// The producing side of a mailbox was closed
    #[error("mailbox closed")]
    MailboxClosed,
}
