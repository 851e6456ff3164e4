//! Device/register synchronization engine
//!
//! Binds a fixed, ordered list of I/O devices (relays, digital and analog
//! inputs, typed variables, a heartbeat liveness monitor) to the four Modbus
//! register spaces and keeps both sides in step once per control cycle.
//!
//! # Architecture
//!
//! - [`device`] - the capability contract ([`IoDevice`]) and the closed set of
//!   device variants ([`Device`])
//! - [`binding`] - [`SyncBinding`], one device bound to one register slot with
//!   change-suppressed pull/push
//! - [`coordinator`] - [`SafetyCoordinator`], the ordered binding list, fault
//!   word and the Normal/SafeState machine
//! - [`register`] - the register-map collaborator seam and an in-memory map
//! - [`pin`] - the pin-access collaborator seam
//!
//! Everything here runs on one logical thread: a cycle runs to completion
//! before the next begins, so no locking discipline is required inside the core.

pub mod binding;
pub mod clock;
pub mod coordinator;
pub mod cycle;
pub mod device;
pub mod fault;
pub mod pin;
pub mod register;
pub mod status;

pub use binding::SyncBinding;
pub use clock::{Clock, ManualClock, Millis, MonotonicClock};
pub use coordinator::{LinkState, SafetyCoordinator, SystemState};
pub use cycle::CycleGate;
pub use device::{
    AnalogInput, CycleContext, Device, DeviceEvent, DigitalInput, Heartbeat, IoDevice, Relay,
    RelayMode, RegisterWord, SafeAction, SafeStatePolicy, Variable,
};
pub use fault::{FaultBits, FaultCause};
pub use pin::{NullPinBackend, PinBackend, PinMode, SharedPins, SimulatedPinBackend};
pub use register::{
    MemoryRegisterMap, RegisterKind, RegisterMap, RegisterOffsets, INVALID_VALUE,
};
pub use status::StatusLeds;
