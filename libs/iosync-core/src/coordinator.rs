//! Safety coordination
//!
//! [`SafetyCoordinator`] owns the ordered binding list, runs the sync cycle
//! and maintains the fault word. The Normal/SafeState machine is derived from
//! the fault word: safe state is held while any safety-relevant cause
//! (link down, protocol init failure, heartbeat lost) is active, so leaving it
//! requires every one of them to clear.

use std::fmt;

use tracing::{debug, info, warn};

use crate::binding::SyncBinding;
use crate::clock::Millis;
use crate::device::{CycleContext, Device, DeviceEvent};
use crate::fault::{FaultBits, FaultCause};
use crate::register::{RegisterKind, RegisterMap, RegisterOffsets};

/// Transport link state polled from the transport collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Up,
    Down,
    /// Link is coming back; the previous link fault is kept until Up
    Recovering,
}

impl LinkState {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkState::Up)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Up => write!(f, "UP"),
            LinkState::Down => write!(f, "DOWN"),
            LinkState::Recovering => write!(f, "RECOVERING"),
        }
    }
}

/// Process-wide status owned by the coordinator
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemState {
    faults: FaultBits,
    safe_state: bool,
    hold: bool,
    cycles: u64,
}

impl SystemState {
    pub fn faults(&self) -> FaultBits {
        self.faults
    }

    pub fn is_safe_state(&self) -> bool {
        self.safe_state
    }

    /// Safe state pinned by the host regardless of faults
    pub fn is_held(&self) -> bool {
        self.hold
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn wants_safe_state(&self) -> bool {
        self.hold || self.faults.requires_safe_state()
    }
}

#[derive(Debug)]
pub struct SafetyCoordinator {
    bindings: Vec<SyncBinding>,
    offsets: RegisterOffsets,
    state: SystemState,
    ctx: CycleContext,
    sensor_faults: Vec<bool>,
    publish_faults: bool,
    last_fault_word: u16,
}

impl SafetyCoordinator {
    pub fn new(offsets: RegisterOffsets) -> Self {
        Self {
            bindings: Vec::new(),
            offsets,
            state: SystemState::default(),
            ctx: CycleContext::default(),
            sensor_faults: Vec::new(),
            publish_faults: false,
            last_fault_word: 0,
        }
    }

    /// Publish the fault word on the input register after the last binding
    pub fn with_fault_register(mut self, enabled: bool) -> Self {
        self.publish_faults = enabled;
        self
    }

    /// Append a device; its position is its address. Call before [`setup`](Self::setup).
    pub fn register(&mut self, device: impl Into<Device>) -> usize {
        self.bindings.push(SyncBinding::new(device));
        self.sensor_faults.push(false);
        self.bindings.len() - 1
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn offsets(&self) -> RegisterOffsets {
        self.offsets
    }

    pub fn binding(&self, index: usize) -> Option<&SyncBinding> {
        self.bindings.get(index)
    }

    pub fn device(&self, index: usize) -> Option<&Device> {
        self.bindings.get(index).map(SyncBinding::device)
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn fault_word(&self) -> u16 {
        self.state.faults.word()
    }

    pub fn is_safe_state(&self) -> bool {
        self.state.safe_state
    }

    /// Input register address of the fault word, when published
    pub fn fault_address(&self) -> Option<u16> {
        self.publish_faults.then(|| {
            self.offsets
                .address(RegisterKind::InputRegister, self.bindings.len() as u16)
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Size and zero every register space, then set up each binding in order
    ///
    /// Device setup failures are logged and do not stop the remaining devices.
    pub fn setup<M: RegisterMap + ?Sized>(&mut self, map: &mut M) {
        let count = self.bindings.len();
        let input_count = count + usize::from(self.publish_faults);
        map.configure(RegisterKind::Coil, self.offsets.coil, count);
        map.configure(RegisterKind::DiscreteInput, self.offsets.discrete, count);
        map.configure(RegisterKind::HoldingRegister, self.offsets.holding, count);
        map.configure(RegisterKind::InputRegister, self.offsets.input, input_count);
        self.last_fault_word = 0;

        let offsets = self.offsets;
        for (i, binding) in self.bindings.iter_mut().enumerate() {
            let Ok(index) = u16::try_from(i) else {
                warn!("Binding {} exceeds the register address range, skipped", i);
                continue;
            };
            match binding.setup(index, offsets) {
                Ok(()) => debug!("Set up {} at index {}", binding.device().variant_name(), i),
                Err(e) => warn!("{}", e),
            }
        }
        info!("Coordinator ready: {} bindings", count);
    }

    /// One sync cycle over every binding in registration order
    pub fn run_cycle<M: RegisterMap + ?Sized>(&mut self, map: &mut M, now: Millis) {
        self.ctx.now = now;
        for i in 0..self.bindings.len() {
            self.bindings[i].sync_cycle(map, &mut self.ctx);
            if !self.ctx.events.is_empty() {
                let mut events = std::mem::take(&mut self.ctx.events);
                for event in events.drain(..) {
                    self.apply_event(i, event);
                }
                self.ctx.events = events;
            }
        }
        self.state.cycles = self.state.cycles.wrapping_add(1);
        self.publish_fault_word(map);
    }

    fn publish_fault_word<M: RegisterMap + ?Sized>(&mut self, map: &mut M) {
        let Some(address) = self.fault_address() else {
            return;
        };
        let word = self.state.faults.word();
        if word != self.last_fault_word {
            debug!("Fault word push: {} = {:#06x}", address, word);
            map.write_input(address, word);
            self.last_fault_word = word;
        }
    }

    fn apply_event(&mut self, index: usize, event: DeviceEvent) {
        match event {
            DeviceEvent::Liveness { alive } => {
                self.set_fault(FaultCause::HeartbeatLost, !alive);
            },
            DeviceEvent::Sensor { faulted } => {
                if let Some(slot) = self.sensor_faults.get_mut(index) {
                    *slot = faulted;
                }
                let any = self.sensor_faults.iter().any(|f| *f);
                self.set_fault(FaultCause::SensorFault, any);
            },
        }
    }

    // ========================================================================
    // Fault inputs
    // ========================================================================

    /// Set or clear one cause; returns true on an edge
    pub fn set_fault(&mut self, cause: FaultCause, active: bool) -> bool {
        if !self.state.faults.set(cause, active) {
            return false;
        }
        if active {
            warn!("Fault raised: {} (faults: {})", cause, self.state.faults);
        } else {
            info!("Fault cleared: {} (faults: {})", cause, self.state.faults);
        }
        self.reevaluate();
        true
    }

    pub fn apply_link_state(&mut self, link: LinkState) {
        match link {
            LinkState::Up => {
                self.set_fault(FaultCause::LinkDown, false);
            },
            LinkState::Down => {
                self.set_fault(FaultCause::LinkDown, true);
            },
            LinkState::Recovering => {},
        }
    }

    /// Returns true when the ProtocolInitFailure bit changed
    pub fn report_protocol_init(&mut self, ok: bool) -> bool {
        self.set_fault(FaultCause::ProtocolInitFailure, !ok)
    }

    pub fn report_expansion(&mut self, present: bool) {
        self.set_fault(FaultCause::ExpansionMissing, !present);
    }

    // ========================================================================
    // Safe state
    // ========================================================================

    /// Pin safe state on independently of faults (shutdown)
    pub fn hold_safe_state(&mut self) {
        self.state.hold = true;
        self.reevaluate();
    }

    pub fn release_safe_state(&mut self) {
        self.state.hold = false;
        self.reevaluate();
    }

    fn reevaluate(&mut self) {
        let wanted = self.state.wants_safe_state();
        if wanted && !self.state.safe_state {
            self.enter_safe_state();
        } else if !wanted && self.state.safe_state {
            self.leave_safe_state();
        }
    }

    fn enter_safe_state(&mut self) {
        if self.state.safe_state {
            return;
        }
        self.state.safe_state = true;
        info!("Entering safe state (faults: {})", self.state.faults);
        for binding in &mut self.bindings {
            binding.enter_safe_state();
        }
    }

    fn leave_safe_state(&mut self) {
        if !self.state.safe_state {
            return;
        }
        self.state.safe_state = false;
        info!("Leaving safe state");
        for binding in &mut self.bindings {
            binding.leave_safe_state();
        }
    }
}
