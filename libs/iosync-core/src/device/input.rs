//! Sampled inputs
//!
//! Both inputs sample their pin once per `update` and expose the cached value
//! read-only. A failed read keeps the previous sample and raises a sensor
//! fault edge; the first good read afterwards clears it.

use errors::Result;
use tracing::{info, warn};

use super::{CycleContext, DeviceEvent, IoDevice};
use crate::pin::{PinMode, SharedPins};
use crate::register::RegisterKind;

/// Tracks the sensor-fault edge for one input
#[derive(Debug, Default, Clone, Copy)]
struct SampleHealth {
    faulted: bool,
}

impl SampleHealth {
    fn report<T>(&mut self, pin: u32, sample: &Result<T>, ctx: &mut CycleContext) {
        match sample {
            Ok(_) if self.faulted => {
                self.faulted = false;
                info!("Input pin {} recovered", pin);
                ctx.emit(DeviceEvent::Sensor { faulted: false });
            },
            Err(e) if !self.faulted => {
                self.faulted = true;
                warn!("Input pin {} read failed: {}", pin, e);
                ctx.emit(DeviceEvent::Sensor { faulted: true });
            },
            _ => {},
        }
    }
}

// ============================================================================
// Digital input
// ============================================================================

/// Digital input exposed as a discrete input
pub struct DigitalInput {
    pins: SharedPins,
    pin: u32,
    reverse: bool,
    state: bool,
    health: SampleHealth,
}

impl std::fmt::Debug for DigitalInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalInput")
            .field("pin", &self.pin)
            .field("reverse", &self.reverse)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DigitalInput {
    pub fn new(pins: SharedPins, pin: u32) -> Self {
        Self {
            pins,
            pin,
            reverse: false,
            state: false,
            health: SampleHealth::default(),
        }
    }

    /// Invert the sampled level (active-low wiring)
    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl IoDevice for DigitalInput {
    fn kind(&self) -> RegisterKind {
        RegisterKind::DiscreteInput
    }

    fn setup(&mut self) -> Result<()> {
        self.pins.setup(self.pin, PinMode::Input)
    }

    fn update(&mut self, ctx: &mut CycleContext) {
        let sample = self.pins.read(self.pin);
        self.health.report(self.pin, &sample, ctx);
        if let Ok(level) = sample {
            self.state = level != self.reverse;
        }
    }

    fn discrete(&self) -> bool {
        self.state
    }
}

// ============================================================================
// Analog input
// ============================================================================

/// Analog input exposed as an input register
pub struct AnalogInput {
    pins: SharedPins,
    pin: u32,
    value: u16,
    health: SampleHealth,
}

impl std::fmt::Debug for AnalogInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalogInput")
            .field("pin", &self.pin)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl AnalogInput {
    pub fn new(pins: SharedPins, pin: u32) -> Self {
        Self {
            pins,
            pin,
            value: 0,
            health: SampleHealth::default(),
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl IoDevice for AnalogInput {
    fn kind(&self) -> RegisterKind {
        RegisterKind::InputRegister
    }

    fn setup(&mut self) -> Result<()> {
        self.pins.setup(self.pin, PinMode::Input)
    }

    fn update(&mut self, ctx: &mut CycleContext) {
        let sample = self.pins.read_analog(self.pin);
        self.health.report(self.pin, &sample, ctx);
        if let Ok(value) = sample {
            self.value = value;
        }
    }

    fn input_register(&self) -> u16 {
        self.value
    }
}
