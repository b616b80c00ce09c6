//! Infrastructure - configuration, counters and errors
//!
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free telemetry counters
//! - `error` - Library error type

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use error::TelemetryError;
pub use metrics::Metrics;
