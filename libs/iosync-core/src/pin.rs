//! Pin access seam
//!
//! Devices drive and sample physical pins only through [`PinBackend`]. The
//! service supplies a sysfs implementation; [`SimulatedPinBackend`] backs tests
//! and `--simulate` runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use errors::{IoSyncError, Result};
use parking_lot::Mutex;
use tracing::debug;

/// Direction a pin is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinMode {
    Input,
    Output,
}

/// Digital/analog pin access
pub trait PinBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Configure a pin's direction
    fn setup(&self, pin: u32, mode: PinMode) -> Result<()>;

    /// Drive an output pin
    fn write(&self, pin: u32, level: bool) -> Result<()>;

    /// Sample a digital input
    fn read(&self, pin: u32) -> Result<bool>;

    /// Sample an analog input (raw 16-bit reading)
    fn read_analog(&self, _pin: u32) -> Result<u16> {
        Ok(0)
    }

    /// Push buffered output changes to the hardware
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Check whether the expansion hardware is present
    fn is_available(&self) -> bool {
        true
    }
}

/// Shared handle devices hold onto
pub type SharedPins = Arc<dyn PinBackend>;

// ============================================================================
// Null backend
// ============================================================================

/// Backend that accepts every write and reads low
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPinBackend;

impl PinBackend for NullPinBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn setup(&self, _pin: u32, _mode: PinMode) -> Result<()> {
        Ok(())
    }

    fn write(&self, _pin: u32, _level: bool) -> Result<()> {
        Ok(())
    }

    fn read(&self, _pin: u32) -> Result<bool> {
        Ok(false)
    }
}

// ============================================================================
// Simulated backend
// ============================================================================

#[derive(Debug, Default)]
struct SimulatedState {
    modes: HashMap<u32, PinMode>,
    outputs: HashMap<u32, bool>,
    inputs: HashMap<u32, bool>,
    analog: HashMap<u32, u16>,
    failing: HashSet<u32>,
    available: bool,
    flushes: u64,
}

/// In-memory pin backend
///
/// Inputs are injected with [`set_input`](Self::set_input) and
/// [`set_analog`](Self::set_analog); driven outputs are observed with
/// [`level`](Self::level). Pins marked with [`fail_pin`](Self::fail_pin)
/// return errors on every access.
#[derive(Debug)]
pub struct SimulatedPinBackend {
    state: Mutex<SimulatedState>,
}

impl Default for SimulatedPinBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPinBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                available: true,
                ..SimulatedState::default()
            }),
        }
    }

    pub fn set_input(&self, pin: u32, level: bool) {
        self.state.lock().inputs.insert(pin, level);
    }

    pub fn set_analog(&self, pin: u32, value: u16) {
        self.state.lock().analog.insert(pin, value);
    }

    /// Last level driven on an output pin
    pub fn level(&self, pin: u32) -> Option<bool> {
        self.state.lock().outputs.get(&pin).copied()
    }

    pub fn mode(&self, pin: u32) -> Option<PinMode> {
        self.state.lock().modes.get(&pin).copied()
    }

    pub fn fail_pin(&self, pin: u32, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(pin);
        } else {
            state.failing.remove(&pin);
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn flush_count(&self) -> u64 {
        self.state.lock().flushes
    }

    fn check(state: &SimulatedState, pin: u32) -> Result<()> {
        if state.failing.contains(&pin) {
            return Err(IoSyncError::pin(pin, "simulated failure"));
        }
        Ok(())
    }
}

impl PinBackend for SimulatedPinBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn setup(&self, pin: u32, mode: PinMode) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&state, pin)?;
        state.modes.insert(pin, mode);
        debug!("Simulated pin {} configured as {:?}", pin, mode);
        Ok(())
    }

    fn write(&self, pin: u32, level: bool) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&state, pin)?;
        state.outputs.insert(pin, level);
        Ok(())
    }

    fn read(&self, pin: u32) -> Result<bool> {
        let state = self.state.lock();
        Self::check(&state, pin)?;
        Ok(state.inputs.get(&pin).copied().unwrap_or(false))
    }

    fn read_analog(&self, pin: u32) -> Result<u16> {
        let state = self.state.lock();
        Self::check(&state, pin)?;
        Ok(state.analog.get(&pin).copied().unwrap_or(0))
    }

    fn flush(&self) -> Result<()> {
        self.state.lock().flushes += 1;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.state.lock().available
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_simulated_outputs_and_inputs() {
        let pins = SimulatedPinBackend::new();
        pins.setup(4, PinMode::Output).unwrap();
        pins.write(4, true).unwrap();
        assert_eq!(pins.level(4), Some(true));
        assert_eq!(pins.mode(4), Some(PinMode::Output));

        assert!(!pins.read(7).unwrap());
        pins.set_input(7, true);
        assert!(pins.read(7).unwrap());

        pins.set_analog(2, 1234);
        assert_eq!(pins.read_analog(2).unwrap(), 1234);
    }

    #[test]
    fn test_simulated_failures() {
        let pins = SimulatedPinBackend::new();
        pins.fail_pin(3, true);
        assert!(pins.read(3).is_err());
        assert!(pins.write(3, true).is_err());

        pins.fail_pin(3, false);
        assert!(pins.read(3).is_ok());
    }

    #[test]
    fn test_null_backend() {
        let pins = NullPinBackend;
        assert!(pins.write(1, true).is_ok());
        assert!(!pins.read(1).unwrap());
        assert_eq!(pins.read_analog(1).unwrap(), 0);
        assert!(pins.is_available());
    }
}
