//! IO modules - external system interfaces
//!
//! This module contains the adapters around the coordinator:
//! - `reporter` - Reporting sink trait and fan-out
//! - `egress_channel` - Bounded channel reporter feeding egress tasks
//! - `egress` - Event output to file (JSONL format)
//! - `mqtt_egress` - MQTT publisher for analytics events
//! - `device` - Phone state provider
//! - `engine` - Navigation engine observer trait and registry
//! - `replay` - Recorded engine input replay

pub mod device;
pub mod egress;
pub mod egress_channel;
pub mod engine;
pub mod mqtt_egress;
pub mod replay;
pub mod reporter;

// Re-export commonly used types
pub use device::{DeviceStateProvider, StaticDeviceState};
pub use egress::Egress;
pub use egress_channel::{create_egress_channel, EgressSender};
pub use engine::{NavigationObserver, ObserverHub};
pub use mqtt_egress::MqttPublisher;
pub use replay::{read_replay, Replayer};
pub use reporter::{FanoutReporter, TelemetryReporter};
