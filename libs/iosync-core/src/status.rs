//! Green/red status indicator
//!
//! | condition | green | red |
//! |---|---|---|
//! | normal, no faults | on | off |
//! | faults, not in safe state | on | on |
//! | safe state | off | blinking |
//!
//! The red LED toggles on every refresh while in safe state, so the blink
//! rate follows the link-check interval.

use errors::Result;
use tracing::debug;

use crate::coordinator::SystemState;
use crate::pin::{PinMode, SharedPins};

pub struct StatusLeds {
    pins: SharedPins,
    green: u32,
    red: u32,
    blink: bool,
}

impl std::fmt::Debug for StatusLeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusLeds")
            .field("green", &self.green)
            .field("red", &self.red)
            .field("blink", &self.blink)
            .finish_non_exhaustive()
    }
}

impl StatusLeds {
    pub fn new(pins: SharedPins, green: u32, red: u32) -> Self {
        Self {
            pins,
            green,
            red,
            blink: false,
        }
    }

    /// Configure both pins and light both during startup
    pub fn setup(&mut self) -> Result<()> {
        self.pins.setup(self.green, PinMode::Output)?;
        self.pins.setup(self.red, PinMode::Output)?;
        self.pins.write(self.green, true)?;
        self.pins.write(self.red, true)?;
        self.pins.flush()
    }

    pub fn refresh(&mut self, state: &SystemState) {
        let (green, red) = if state.is_safe_state() {
            self.blink = !self.blink;
            (false, self.blink)
        } else {
            self.blink = false;
            (true, !state.faults().is_empty())
        };
        self.show(green, red);
    }

    fn show(&self, green: bool, red: bool) {
        let result = self
            .pins
            .write(self.green, green)
            .and_then(|()| self.pins.write(self.red, red))
            .and_then(|()| self.pins.flush());
        if let Err(e) = result {
            debug!("Status LED update failed: {}", e);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::coordinator::{LinkState, SafetyCoordinator};
    use crate::pin::SimulatedPinBackend;
    use crate::register::RegisterOffsets;

    #[test]
    fn test_led_patterns() {
        let pins = Arc::new(SimulatedPinBackend::new());
        let mut leds = StatusLeds::new(pins.clone(), 20, 21);
        leds.setup().unwrap();
        assert_eq!(pins.level(20), Some(true));
        assert_eq!(pins.level(21), Some(true));

        let mut coordinator = SafetyCoordinator::new(RegisterOffsets::default());
        leds.refresh(coordinator.state());
        assert_eq!((pins.level(20), pins.level(21)), (Some(true), Some(false)));

        coordinator.report_expansion(false);
        leds.refresh(coordinator.state());
        assert_eq!((pins.level(20), pins.level(21)), (Some(true), Some(true)));

        coordinator.apply_link_state(LinkState::Down);
        leds.refresh(coordinator.state());
        assert_eq!((pins.level(20), pins.level(21)), (Some(false), Some(true)));
        leds.refresh(coordinator.state());
        assert_eq!(pins.level(21), Some(false));
        leds.refresh(coordinator.state());
        assert_eq!(pins.level(21), Some(true));
    }
}
