//! Device-to-register binding with change suppression
//!
//! Each binding owns one device and one slot per register space it uses. A
//! slot keeps a single shadow value shared by both directions: a value pulled
//! from the map is not pushed back, and a value pushed is not pulled back as a
//! change on the next cycle.

use errors::{IoSyncError, Result};
use tracing::debug;

use crate::device::{CycleContext, Device, IoDevice};
use crate::register::{RegisterKind, RegisterMap, RegisterOffsets};

#[derive(Debug)]
pub struct SyncBinding {
    device: Device,
    index: u16,
    offsets: RegisterOffsets,
    /// Shadow of the slot in the device's own space
    last_primary: u16,
    /// Shadow of the extended holding slot used by coil devices
    last_secondary: u16,
}

impl SyncBinding {
    pub fn new(device: impl Into<Device>) -> Self {
        Self {
            device: device.into(),
            index: 0,
            offsets: RegisterOffsets::default(),
            last_primary: 0,
            last_secondary: 0,
        }
    }

    /// Assign the slot index and initialize the device
    pub fn setup(&mut self, index: u16, offsets: RegisterOffsets) -> Result<()> {
        self.index = index;
        self.offsets = offsets;
        self.device
            .setup()
            .map_err(|e| IoSyncError::DeviceSetup {
                index: index as usize,
                reason: e.to_string(),
            })
    }

    pub fn kind(&self) -> RegisterKind {
        self.device.kind()
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    /// Bus address of this binding in the given space
    pub fn address(&self, kind: RegisterKind) -> u16 {
        self.offsets.address(kind, self.index)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    /// Update the device, then pull external writes, then push device values
    pub fn sync_cycle<M: RegisterMap + ?Sized>(&mut self, map: &mut M, ctx: &mut CycleContext) {
        self.device.update(ctx);
        self.pull(map);
        self.push(map);
    }

    pub fn enter_safe_state(&mut self) {
        self.device.enter_safe_state();
    }

    pub fn leave_safe_state(&mut self) {
        self.device.leave_safe_state();
    }

    fn pull<M: RegisterMap + ?Sized>(&mut self, map: &mut M) {
        match self.kind() {
            RegisterKind::Coil => {
                let address = self.address(RegisterKind::Coil);
                let value = map.read_coil(address);
                if value != (self.last_primary != 0) {
                    debug!("Coil pull: {} = {}", address, value);
                    self.device.set_coil(value);
                    self.last_primary = u16::from(value);
                }
                self.pull_secondary(map);
            },
            RegisterKind::HoldingRegister => {
                let address = self.address(RegisterKind::HoldingRegister);
                let value = map.read_holding(address);
                if value != self.last_primary {
                    debug!("Holding pull: {} = {}", address, value);
                    self.device.set_holding(value);
                    self.last_primary = value;
                }
            },
            _ => {},
        }
    }

    fn pull_secondary<M: RegisterMap + ?Sized>(&mut self, map: &mut M) {
        let address = self.address(RegisterKind::HoldingRegister);
        let value = map.read_holding(address);
        if value != self.last_secondary {
            debug!("Holding pull: {} = {}", address, value);
            self.device.set_holding(value);
            self.last_secondary = value;
        }
    }

    fn push<M: RegisterMap + ?Sized>(&mut self, map: &mut M) {
        match self.kind() {
            RegisterKind::Coil => {
                let state = self.device.coil();
                if state != (self.last_primary != 0) {
                    let address = self.address(RegisterKind::Coil);
                    debug!("Coil push: {} = {}", address, state);
                    map.write_coil(address, state);
                    self.last_primary = u16::from(state);
                }
                // Extended holding value is always exported
                let value = self.device.holding();
                if value != self.last_secondary {
                    let address = self.address(RegisterKind::HoldingRegister);
                    debug!("Holding push: {} = {}", address, value);
                    map.write_holding(address, value);
                    self.last_secondary = value;
                }
            },
            RegisterKind::DiscreteInput => {
                let state = self.device.discrete();
                if state != (self.last_primary != 0) {
                    let address = self.address(RegisterKind::DiscreteInput);
                    debug!("Discrete push: {} = {}", address, state);
                    map.write_discrete(address, state);
                    self.last_primary = u16::from(state);
                }
            },
            RegisterKind::HoldingRegister => {
                let value = self.device.holding();
                if value != self.last_primary {
                    let address = self.address(RegisterKind::HoldingRegister);
                    debug!("Holding push: {} = {}", address, value);
                    map.write_holding(address, value);
                    self.last_primary = value;
                }
            },
            RegisterKind::InputRegister => {
                let value = self.device.input_register();
                if value != self.last_primary {
                    let address = self.address(RegisterKind::InputRegister);
                    debug!("Input push: {} = {}", address, value);
                    map.write_input(address, value);
                    self.last_primary = value;
                }
            },
            RegisterKind::Undefined => {},
        }
    }
}
