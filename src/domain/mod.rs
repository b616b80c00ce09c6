//! Domain models - navigation inputs and analytics event payloads
//!
//! - `types` - what the navigation engine delivers (locations, routes, progress)
//! - `event` - what the collector receives (depart, arrive, cancel, reroute,
//!   feedback, turnstile)

pub mod event;
pub mod types;
