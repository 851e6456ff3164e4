//! Register map seam
//!
//! The external transport owns four independently addressed register spaces.
//! The core only ever talks to them through [`RegisterMap`]; accesses are
//! synchronous and always succeed from the core's point of view (an address
//! outside a configured space reads as zero/false and drops writes).

use std::fmt;
use std::str::FromStr;

use errors::{IoSyncError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sentinel returned by 16-bit accessors that do not apply to a device's kind
pub const INVALID_VALUE: u16 = 0xFFFF;

// ============================================================================
// Register kinds and offsets
// ============================================================================

/// Register space a device is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// No register mapping
    #[default]
    Undefined,
    /// Single-bit read/write
    Coil,
    /// Single-bit read-only
    DiscreteInput,
    /// 16-bit read/write
    HoldingRegister,
    /// 16-bit read-only
    InputRegister,
}

impl RegisterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Coil => "coil",
            Self::DiscreteInput => "discrete_input",
            Self::HoldingRegister => "holding_register",
            Self::InputRegister => "input_register",
        }
    }

    /// Check if an external client may write this space
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Coil | Self::HoldingRegister)
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RegisterKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coil" | "co" => Ok(Self::Coil),
            "discrete_input" | "di" => Ok(Self::DiscreteInput),
            "holding_register" | "hr" => Ok(Self::HoldingRegister),
            "input_register" | "ir" => Ok(Self::InputRegister),
            "undefined" => Ok(Self::Undefined),
            _ => Err(format!(
                "Invalid register kind: {}. Must be one of coil/discrete_input/holding_register/input_register",
                s
            )),
        }
    }
}

/// Fixed per-space base offsets keeping the four spaces disjoint on the wire
///
/// Binding `i` lives at `offset + i` in its space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOffsets {
    #[serde(default)]
    pub coil: u16,
    #[serde(default = "default_discrete_offset")]
    pub discrete: u16,
    #[serde(default = "default_input_offset")]
    pub input: u16,
    #[serde(default = "default_holding_offset")]
    pub holding: u16,
}

fn default_discrete_offset() -> u16 {
    10000
}

fn default_input_offset() -> u16 {
    30000
}

fn default_holding_offset() -> u16 {
    40000
}

impl Default for RegisterOffsets {
    fn default() -> Self {
        Self {
            coil: 0,
            discrete: default_discrete_offset(),
            input: default_input_offset(),
            holding: default_holding_offset(),
        }
    }
}

impl RegisterOffsets {
    pub fn offset(&self, kind: RegisterKind) -> u16 {
        match kind {
            RegisterKind::Coil => self.coil,
            RegisterKind::DiscreteInput => self.discrete,
            RegisterKind::InputRegister => self.input,
            RegisterKind::HoldingRegister => self.holding,
            RegisterKind::Undefined => 0,
        }
    }

    /// Bus address of slot `index` in the given space
    pub fn address(&self, kind: RegisterKind, index: u16) -> u16 {
        self.offset(kind).saturating_add(index)
    }
}

// ============================================================================
// RegisterMap trait
// ============================================================================

/// Register access consumed by the core once per cycle per binding
pub trait RegisterMap {
    /// Size a space to `count` slots starting at `offset` and zero it
    fn configure(&mut self, kind: RegisterKind, offset: u16, count: usize);

    fn read_coil(&self, address: u16) -> bool;
    fn write_coil(&mut self, address: u16, value: bool);

    fn read_discrete(&self, address: u16) -> bool;
    fn write_discrete(&mut self, address: u16, value: bool);

    fn read_holding(&self, address: u16) -> u16;
    fn write_holding(&mut self, address: u16, value: u16);

    fn read_input(&self, address: u16) -> u16;
    fn write_input(&mut self, address: u16, value: u16);
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// One contiguous register space
#[derive(Debug, Clone, Default)]
struct RegisterSpace<T> {
    offset: u16,
    values: Vec<T>,
}

impl<T: Copy + Default> RegisterSpace<T> {
    fn configure(&mut self, offset: u16, count: usize) {
        self.offset = offset;
        self.values.clear();
        self.values.resize(count, T::default());
    }

    fn slot(&self, address: u16) -> Option<usize> {
        let index = address.checked_sub(self.offset)? as usize;
        (index < self.values.len()).then_some(index)
    }

    fn get(&self, address: u16) -> Option<T> {
        self.slot(address).map(|i| self.values[i])
    }

    fn set(&mut self, address: u16, value: T) -> bool {
        match self.slot(address) {
            Some(i) => {
                self.values[i] = value;
                true
            },
            None => false,
        }
    }

    fn range(&self, address: u16, count: u16) -> Option<&[T]> {
        let start = self.slot(address)?;
        let end = start.checked_add(count as usize)?;
        self.values.get(start..end)
    }

    fn range_mut(&mut self, address: u16, count: usize) -> Option<&mut [T]> {
        let start = self.slot(address)?;
        let end = start.checked_add(count)?;
        self.values.get_mut(start..end)
    }
}

/// Register map held in process memory
///
/// Used directly by the core in tests and shared with the Modbus transport in
/// the service. Counts every successful write so callers can observe change
/// suppression.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegisterMap {
    coils: RegisterSpace<bool>,
    discrete_inputs: RegisterSpace<bool>,
    holding_registers: RegisterSpace<u16>,
    input_registers: RegisterSpace<u16>,
    write_count: u64,
}

impl MemoryRegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of writes accepted since construction
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Number of slots configured for a space
    pub fn len(&self, kind: RegisterKind) -> usize {
        match kind {
            RegisterKind::Coil => self.coils.values.len(),
            RegisterKind::DiscreteInput => self.discrete_inputs.values.len(),
            RegisterKind::HoldingRegister => self.holding_registers.values.len(),
            RegisterKind::InputRegister => self.input_registers.values.len(),
            RegisterKind::Undefined => 0,
        }
    }

    fn record(&mut self, accepted: bool, kind: RegisterKind, address: u16) {
        if accepted {
            self.write_count += 1;
        } else {
            debug!("Dropped write outside {} space: {}", kind, address);
        }
    }

    // ======================================
    // Range access for transports
    // ======================================

    pub fn coils(&self, address: u16, count: u16) -> Result<Vec<bool>> {
        self.coils
            .range(address, count)
            .map(<[bool]>::to_vec)
            .ok_or_else(|| out_of_range(RegisterKind::Coil, address))
    }

    pub fn discrete_inputs(&self, address: u16, count: u16) -> Result<Vec<bool>> {
        self.discrete_inputs
            .range(address, count)
            .map(<[bool]>::to_vec)
            .ok_or_else(|| out_of_range(RegisterKind::DiscreteInput, address))
    }

    pub fn holding_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.holding_registers
            .range(address, count)
            .map(<[u16]>::to_vec)
            .ok_or_else(|| out_of_range(RegisterKind::HoldingRegister, address))
    }

    pub fn input_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.input_registers
            .range(address, count)
            .map(<[u16]>::to_vec)
            .ok_or_else(|| out_of_range(RegisterKind::InputRegister, address))
    }

    /// Write consecutive coils; all-or-nothing
    pub fn set_coils(&mut self, address: u16, values: &[bool]) -> Result<()> {
        let slots = self
            .coils
            .range_mut(address, values.len())
            .ok_or_else(|| out_of_range(RegisterKind::Coil, address))?;
        slots.copy_from_slice(values);
        self.write_count += values.len() as u64;
        Ok(())
    }

    /// Write consecutive holding registers; all-or-nothing
    pub fn set_holding_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        let slots = self
            .holding_registers
            .range_mut(address, values.len())
            .ok_or_else(|| out_of_range(RegisterKind::HoldingRegister, address))?;
        slots.copy_from_slice(values);
        self.write_count += values.len() as u64;
        Ok(())
    }
}

fn out_of_range(kind: RegisterKind, address: u16) -> IoSyncError {
    IoSyncError::AddressOutOfRange {
        space: kind.to_string(),
        address,
    }
}

impl RegisterMap for MemoryRegisterMap {
    fn configure(&mut self, kind: RegisterKind, offset: u16, count: usize) {
        match kind {
            RegisterKind::Coil => self.coils.configure(offset, count),
            RegisterKind::DiscreteInput => self.discrete_inputs.configure(offset, count),
            RegisterKind::HoldingRegister => self.holding_registers.configure(offset, count),
            RegisterKind::InputRegister => self.input_registers.configure(offset, count),
            RegisterKind::Undefined => {},
        }
        debug!("Configured {} space: {} slots at {}", kind, count, offset);
    }

    fn read_coil(&self, address: u16) -> bool {
        self.coils.get(address).unwrap_or(false)
    }

    fn write_coil(&mut self, address: u16, value: bool) {
        let accepted = self.coils.set(address, value);
        self.record(accepted, RegisterKind::Coil, address);
    }

    fn read_discrete(&self, address: u16) -> bool {
        self.discrete_inputs.get(address).unwrap_or(false)
    }

    fn write_discrete(&mut self, address: u16, value: bool) {
        let accepted = self.discrete_inputs.set(address, value);
        self.record(accepted, RegisterKind::DiscreteInput, address);
    }

    fn read_holding(&self, address: u16) -> u16 {
        self.holding_registers.get(address).unwrap_or(0)
    }

    fn write_holding(&mut self, address: u16, value: u16) {
        let accepted = self.holding_registers.set(address, value);
        self.record(accepted, RegisterKind::HoldingRegister, address);
    }

    fn read_input(&self, address: u16) -> u16 {
        self.input_registers.get(address).unwrap_or(0)
    }

    fn write_input(&mut self, address: u16, value: u16) {
        let accepted = self.input_registers.set(address, value);
        self.record(accepted, RegisterKind::InputRegister, address);
    }
}
