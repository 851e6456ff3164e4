//! iosrv configuration
//!
//! Loaded with figment: built-in defaults, then the YAML file, then
//! `IOSRV_`-prefixed environment variables (`__` separates nesting, e.g.
//! `IOSRV_MODBUS__PORT=1502`). The device list order is the register order.

use std::collections::HashSet;
use std::path::Path;

use errors::{IoSyncError, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use iosync_core::{RegisterKind, RegisterOffsets, SafeAction};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/iosrv.yaml";
pub const ENV_PREFIX: &str = "IOSRV_";

// ============================================================================
// Sections
// ============================================================================

/// Service loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Minimum time between two sync cycles
    #[serde(default = "default_cycle_period_ms")]
    pub cycle_period_ms: u64,
    /// Outer loop tick
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Minimum time between two link checks
    #[serde(default = "default_link_check_interval_ms")]
    pub link_check_interval_ms: u64,
}

fn default_service_name() -> String {
    "iosrv".to_string()
}

fn default_cycle_period_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_link_check_interval_ms() -> u64 {
    500
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            cycle_period_ms: default_cycle_period_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            link_check_interval_ms: default_link_check_interval_ms(),
        }
    }
}

/// Modbus TCP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub offsets: RegisterOffsets,
    /// Publish the fault word after the last input register
    #[serde(default = "default_true")]
    pub fault_register: bool,
}

fn default_true() -> bool {
    true
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    502
}

impl Default for ModbusSection {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_address(),
            port: default_port(),
            offsets: RegisterOffsets::default(),
            fault_register: true,
        }
    }
}

impl ModbusSection {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    300_000
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Pin backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PinBackendKind {
    #[default]
    Sysfs,
    Simulated,
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinsSection {
    #[serde(default)]
    pub backend: PinBackendKind,
    #[serde(default = "default_gpio_base_path")]
    pub gpio_base_path: String,
    #[serde(default = "default_analog_base_path")]
    pub analog_base_path: String,
}

fn default_gpio_base_path() -> String {
    "/sys/class/gpio".to_string()
}

fn default_analog_base_path() -> String {
    "/sys/bus/iio/devices/iio:device0".to_string()
}

impl Default for PinsSection {
    fn default() -> Self {
        Self {
            backend: PinBackendKind::default(),
            gpio_base_path: default_gpio_base_path(),
            analog_base_path: default_analog_base_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLedSection {
    pub green_pin: u32,
    pub red_pin: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkSection {
    /// Network interface whose operstate is polled; none means always up
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
    /// Write a daily log file under `dir`
    #[serde(default)]
    pub file: bool,
}

// ============================================================================
// Devices
// ============================================================================

/// Auto-off behaviour of a configured relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelayModeConfig {
    #[default]
    Stable,
    SelfResetting,
}

/// Value source behind a variable register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    /// Read/write cell for the client's own use
    Scratch,
    /// Seconds since service start, read-only
    UptimeSeconds,
    /// Completed sync cycles, read-only
    CycleCount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceConfig {
    Relay {
        pin: u32,
        #[serde(default)]
        led_pin: Option<u32>,
        #[serde(default)]
        mode: RelayModeConfig,
        #[serde(default)]
        on_enter: SafeAction,
        #[serde(default)]
        on_leave: SafeAction,
        /// Overrides `relay_max_on_ms` for this relay
        #[serde(default)]
        max_on_ms: Option<u64>,
    },
    DigitalInput {
        pin: u32,
        #[serde(default)]
        reverse: bool,
    },
    AnalogInput {
        pin: u32,
    },
    Variable {
        source: VariableSource,
        #[serde(default)]
        initial: Option<u16>,
    },
    Heartbeat {
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default = "default_true")]
        drives_safe_state: bool,
    },
}

impl DeviceConfig {
    pub fn kind(&self) -> RegisterKind {
        match self {
            Self::Relay { .. } => RegisterKind::Coil,
            Self::DigitalInput { .. } => RegisterKind::DiscreteInput,
            Self::AnalogInput { .. } => RegisterKind::InputRegister,
            Self::Variable { .. } | Self::Heartbeat { .. } => RegisterKind::HoldingRegister,
        }
    }

    /// Pins this device drives
    fn output_pins(&self) -> Vec<u32> {
        match self {
            Self::Relay { pin, led_pin, .. } => std::iter::once(*pin).chain(*led_pin).collect(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoSrvConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub modbus: ModbusSection,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
    /// Default max-on duration of self-resetting relays
    #[serde(default = "default_relay_max_on_ms")]
    pub relay_max_on_ms: u64,
    #[serde(default)]
    pub pins: PinsSection,
    #[serde(default)]
    pub status_leds: Option<StatusLedSection>,
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

fn default_relay_max_on_ms() -> u64 {
    300_000
}

impl Default for IoSrvConfig {
    fn default() -> Self {
        Self {
            service: ServiceSection::default(),
            modbus: ModbusSection::default(),
            heartbeat: HeartbeatSection::default(),
            relay_max_on_ms: default_relay_max_on_ms(),
            pins: PinsSection::default(),
            status_leds: None,
            link: LinkSection::default(),
            logging: LoggingSection::default(),
            devices: Vec::new(),
        }
    }
}

impl IoSrvConfig {
    /// Load defaults, then the YAML file, then environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults and environment", path.display());
        }
        Figment::from(Serialized::defaults(IoSrvConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| IoSyncError::config(format!("Failed to load configuration: {}", e)))
    }

    /// Parse a YAML document over the defaults, without environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Figment::from(Serialized::defaults(IoSrvConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .map_err(|e| IoSyncError::config(format!("Failed to parse configuration: {}", e)))
    }

    /// Number of input registers, including the fault word slot
    pub fn input_register_count(&self) -> usize {
        self.devices.len() + usize::from(self.modbus.fault_register)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.name.is_empty() {
            return Err(IoSyncError::invalid_config("service.name", "cannot be empty"));
        }
        if self.devices.is_empty() {
            return Err(IoSyncError::invalid_config(
                "devices",
                "at least one device must be configured",
            ));
        }
        for (field, value) in [
            ("service.cycle_period_ms", self.service.cycle_period_ms),
            ("service.poll_interval_ms", self.service.poll_interval_ms),
            ("service.link_check_interval_ms", self.service.link_check_interval_ms),
            ("heartbeat.timeout_ms", self.heartbeat.timeout_ms),
            ("relay_max_on_ms", self.relay_max_on_ms),
        ] {
            if value == 0 {
                return Err(IoSyncError::invalid_config(field, "must be > 0"));
            }
        }
        if self.pins.backend == PinBackendKind::Sysfs && self.pins.gpio_base_path.is_empty() {
            return Err(IoSyncError::invalid_config("pins.gpio_base_path", "cannot be empty"));
        }

        self.validate_register_spaces()?;
        self.validate_devices()
    }

    fn validate_register_spaces(&self) -> Result<()> {
        let offsets = self.modbus.offsets;
        let count = self.devices.len() as u32;
        let spaces = [
            ("coil", u32::from(offsets.coil), count),
            ("discrete", u32::from(offsets.discrete), count),
            ("input", u32::from(offsets.input), self.input_register_count() as u32),
            ("holding", u32::from(offsets.holding), count),
        ];

        for (name, start, len) in spaces {
            if start + len > u32::from(u16::MAX) + 1 {
                return Err(IoSyncError::invalid_config(
                    format!("modbus.offsets.{}", name),
                    format!("{} registers from {} exceed the address range", len, start),
                ));
            }
        }
        for (i, &(name_a, start_a, len_a)) in spaces.iter().enumerate() {
            for &(name_b, start_b, len_b) in &spaces[i + 1..] {
                if start_a < start_b + len_b && start_b < start_a + len_a {
                    return Err(IoSyncError::invalid_config(
                        "modbus.offsets",
                        format!("{} and {} register spaces overlap", name_a, name_b),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_devices(&self) -> Result<()> {
        let mut outputs = HashSet::new();
        let leds = self
            .status_leds
            .iter()
            .flat_map(|leds| [leds.green_pin, leds.red_pin]);
        let device_outputs = self.devices.iter().flat_map(DeviceConfig::output_pins);
        for pin in leds.chain(device_outputs) {
            if !outputs.insert(pin) {
                return Err(IoSyncError::invalid_config(
                    "devices",
                    format!("output pin {} is driven by more than one device", pin),
                ));
            }
        }

        for (i, device) in self.devices.iter().enumerate() {
            match device {
                DeviceConfig::Relay {
                    mode: RelayModeConfig::SelfResetting,
                    max_on_ms: Some(0),
                    ..
                } => {
                    return Err(IoSyncError::invalid_config(
                        format!("devices[{}].max_on_ms", i),
                        "must be > 0",
                    ));
                },
                DeviceConfig::Heartbeat {
                    timeout_ms: Some(0),
                    ..
                } => {
                    return Err(IoSyncError::invalid_config(
                        format!("devices[{}].timeout_ms", i),
                        "must be > 0",
                    ));
                },
                DeviceConfig::Variable {
                    source: source @ (VariableSource::UptimeSeconds | VariableSource::CycleCount),
                    initial: Some(_),
                } => {
                    return Err(IoSyncError::invalid_config(
                        format!("devices[{}].initial", i),
                        format!("{:?} variables are read-only and take no initial value", source),
                    ));
                },
                _ => {},
            }
        }
        Ok(())
    }
}
