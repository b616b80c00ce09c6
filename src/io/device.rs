//! Phone state provider
//!
//! The host application owns battery, connectivity and audio state; the
//! coordinator samples it each time an event envelope is assembled.

use crate::domain::event::PhoneState;

pub trait DeviceStateProvider: Send + Sync {
    fn phone_state(&self) -> PhoneState;
}

/// Fixed phone state, typically from the `[device]` config section
pub struct StaticDeviceState {
    state: PhoneState,
}

impl StaticDeviceState {
    pub fn new(state: PhoneState) -> Self {
        Self { state }
    }
}

impl DeviceStateProvider for StaticDeviceState {
    fn phone_state(&self) -> PhoneState {
        self.state.clone()
    }
}
