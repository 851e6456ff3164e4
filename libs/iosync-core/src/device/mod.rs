//! Device capability contract and variants
//!
//! Every device answers the full [`IoDevice`] surface. Only the accessor pair
//! matching its [`RegisterKind`] is meaningful; the defaults here make every
//! other accessor inert (reads return `false` / [`INVALID_VALUE`], writes do
//! nothing), so variants override only what applies to them.

mod heartbeat;
mod input;
mod relay;
mod variable;

pub use heartbeat::Heartbeat;
pub use input::{AnalogInput, DigitalInput};
pub use relay::{Relay, RelayMode};
pub use variable::{RegisterWord, Variable};

use std::fmt;

use errors::Result;
use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::register::{RegisterKind, INVALID_VALUE};

// ============================================================================
// Cycle context
// ============================================================================

/// Notification a device raises towards the coordinator during `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Liveness monitor changed state
    Liveness { alive: bool },
    /// Input sampling started or stopped failing
    Sensor { faulted: bool },
}

/// Per-cycle input handed to every device update
///
/// Carries the cycle timestamp and collects the events devices raise. The
/// coordinator drains the events after each binding so transitions take
/// effect before the next binding is processed.
#[derive(Debug, Default)]
pub struct CycleContext {
    pub now: Millis,
    pub(crate) events: Vec<DeviceEvent>,
}

impl CycleContext {
    pub fn new(now: Millis) -> Self {
        Self {
            now,
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: DeviceEvent) {
        self.events.push(event);
    }

    /// Events raised since the last drain
    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

// ============================================================================
// Safe-state policy
// ============================================================================

/// What an output does at a safe-state boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeAction {
    /// Leave the output alone
    #[default]
    Ignore,
    #[serde(alias = "switch_on", alias = "on")]
    ForceOn,
    #[serde(alias = "switch_off", alias = "off")]
    ForceOff,
    /// Reapply the level remembered when safe state began
    Restore,
}

impl SafeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::ForceOn => "force_on",
            Self::ForceOff => "force_off",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for SafeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actions applied when safe state begins and when it ends
///
/// Entry only forces a level for `ForceOn`/`ForceOff`. `Restore` on entry
/// leaves the output untouched and `Ignore` on entry keeps the device out of
/// safe state entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SafeStatePolicy {
    #[serde(default)]
    pub on_enter: SafeAction,
    #[serde(default)]
    pub on_leave: SafeAction,
}

impl SafeStatePolicy {
    pub fn new(on_enter: SafeAction, on_leave: SafeAction) -> Self {
        Self { on_enter, on_leave }
    }

    /// Same action on both boundaries
    pub fn uniform(action: SafeAction) -> Self {
        Self::new(action, action)
    }
}

// ============================================================================
// IoDevice trait
// ============================================================================

/// Capability surface shared by every register-backed device
pub trait IoDevice: Send {
    /// Register space this device is bound to; fixed at construction
    fn kind(&self) -> RegisterKind;

    /// One-time initialization; failures are logged by the caller
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Advance timers and sampling; runs once per cycle before any register exchange
    fn update(&mut self, _ctx: &mut CycleContext) {}

    fn coil(&self) -> bool {
        false
    }

    fn set_coil(&mut self, _value: bool) {}

    fn discrete(&self) -> bool {
        false
    }

    fn holding(&self) -> u16 {
        INVALID_VALUE
    }

    fn set_holding(&mut self, _value: u16) {}

    fn input_register(&self) -> u16 {
        INVALID_VALUE
    }

    /// Apply the entry policy; a no-op while already in safe state
    fn enter_safe_state(&mut self) {}

    /// Apply the exit policy; a no-op while not in safe state
    fn leave_safe_state(&mut self) {}

    fn in_safe_state(&self) -> bool {
        false
    }
}

// ============================================================================
// Device variants
// ============================================================================

/// Closed set of device variants a binding can own
#[derive(Debug)]
pub enum Device {
    Relay(Relay),
    DigitalInput(DigitalInput),
    AnalogInput(AnalogInput),
    Variable(Variable),
    Heartbeat(Heartbeat),
}

macro_rules! dispatch {
    ($self:expr, $dev:ident => $body:expr) => {
        match $self {
            Device::Relay($dev) => $body,
            Device::DigitalInput($dev) => $body,
            Device::AnalogInput($dev) => $body,
            Device::Variable($dev) => $body,
            Device::Heartbeat($dev) => $body,
        }
    };
}

impl Device {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Relay(_) => "relay",
            Self::DigitalInput(_) => "digital_input",
            Self::AnalogInput(_) => "analog_input",
            Self::Variable(_) => "variable",
            Self::Heartbeat(_) => "heartbeat",
        }
    }

    pub fn as_relay(&self) -> Option<&Relay> {
        match self {
            Self::Relay(relay) => Some(relay),
            _ => None,
        }
    }

    pub fn as_heartbeat(&self) -> Option<&Heartbeat> {
        match self {
            Self::Heartbeat(heartbeat) => Some(heartbeat),
            _ => None,
        }
    }
}

impl IoDevice for Device {
    fn kind(&self) -> RegisterKind {
        dispatch!(self, d => d.kind())
    }

    fn setup(&mut self) -> Result<()> {
        dispatch!(self, d => d.setup())
    }

    fn update(&mut self, ctx: &mut CycleContext) {
        dispatch!(self, d => d.update(ctx))
    }

    fn coil(&self) -> bool {
        dispatch!(self, d => d.coil())
    }

    fn set_coil(&mut self, value: bool) {
        dispatch!(self, d => d.set_coil(value))
    }

    fn discrete(&self) -> bool {
        dispatch!(self, d => d.discrete())
    }

    fn holding(&self) -> u16 {
        dispatch!(self, d => d.holding())
    }

    fn set_holding(&mut self, value: u16) {
        dispatch!(self, d => d.set_holding(value))
    }

    fn input_register(&self) -> u16 {
        dispatch!(self, d => d.input_register())
    }

    fn enter_safe_state(&mut self) {
        dispatch!(self, d => d.enter_safe_state())
    }

    fn leave_safe_state(&mut self) {
        dispatch!(self, d => d.leave_safe_state())
    }

    fn in_safe_state(&self) -> bool {
        dispatch!(self, d => d.in_safe_state())
    }
}

impl From<Relay> for Device {
    fn from(relay: Relay) -> Self {
        Self::Relay(relay)
    }
}

impl From<DigitalInput> for Device {
    fn from(input: DigitalInput) -> Self {
        Self::DigitalInput(input)
    }
}

impl From<AnalogInput> for Device {
    fn from(input: AnalogInput) -> Self {
        Self::AnalogInput(input)
    }
}

impl From<Variable> for Device {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<Heartbeat> for Device {
    fn from(heartbeat: Heartbeat) -> Self {
        Self::Heartbeat(heartbeat)
    }
}
