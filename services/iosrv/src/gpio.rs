//! Linux sysfs pin backend
//!
//! Digital pins live under `{gpio_base}/gpio{n}/value`, analog channels are
//! read from `{analog_base}/in_voltage{n}_raw` (IIO).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use errors::{IoSyncError, Result};
use iosync_core::{NullPinBackend, PinBackend, PinMode, SharedPins, SimulatedPinBackend};
use tracing::{debug, info, warn};

use crate::config::{PinBackendKind, PinsSection};

pub struct SysfsPinBackend {
    gpio_base: PathBuf,
    analog_base: PathBuf,
}

impl SysfsPinBackend {
    pub fn new(gpio_base: impl Into<PathBuf>, analog_base: impl Into<PathBuf>) -> Self {
        Self {
            gpio_base: gpio_base.into(),
            analog_base: analog_base.into(),
        }
    }

    fn gpio_dir(&self, pin: u32) -> PathBuf {
        self.gpio_base.join(format!("gpio{}", pin))
    }

    fn value_path(&self, pin: u32) -> PathBuf {
        self.gpio_dir(pin).join("value")
    }
}

impl Default for SysfsPinBackend {
    fn default() -> Self {
        Self::new("/sys/class/gpio", "/sys/bus/iio/devices/iio:device0")
    }
}

impl PinBackend for SysfsPinBackend {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn setup(&self, pin: u32, mode: PinMode) -> Result<()> {
        let gpio_dir = self.gpio_dir(pin);
        if !gpio_dir.exists() {
            if let Err(e) = std::fs::write(self.gpio_base.join("export"), pin.to_string()) {
                // Already exported by someone else
                if !e.to_string().contains("Device or resource busy") {
                    warn!("Failed to export GPIO {}: {}", pin, e);
                }
            }
        }

        let direction = match mode {
            PinMode::Input => "in",
            PinMode::Output => "out",
        };
        std::fs::write(gpio_dir.join("direction"), direction).map_err(|e| {
            IoSyncError::pin(pin, format!("set direction {} failed: {}", direction, e))
        })
    }

    fn write(&self, pin: u32, level: bool) -> Result<()> {
        let content = if level { "1" } else { "0" };
        std::fs::write(self.value_path(pin), content)
            .map_err(|e| IoSyncError::pin(pin, format!("write failed: {}", e)))
    }

    fn read(&self, pin: u32) -> Result<bool> {
        match std::fs::read_to_string(self.value_path(pin)) {
            Ok(content) => Ok(content.trim() == "1"),
            Err(e) => {
                debug!("Failed to read GPIO {}: {}", pin, e);
                Err(IoSyncError::pin(pin, format!("read failed: {}", e)))
            },
        }
    }

    fn read_analog(&self, pin: u32) -> Result<u16> {
        let path = self.analog_base.join(format!("in_voltage{}_raw", pin));
        let content = std::fs::read_to_string(&path)
            .map_err(|e| IoSyncError::pin(pin, format!("analog read failed: {}", e)))?;
        content
            .trim()
            .parse::<u32>()
            .map(|raw| raw.min(u32::from(u16::MAX)) as u16)
            .map_err(|e| IoSyncError::pin(pin, format!("bad analog sample: {}", e)))
    }

    fn is_available(&self) -> bool {
        Path::new(&self.gpio_base).exists()
    }
}

/// Build the configured backend; `simulate` overrides the configured kind
pub fn build_pins(section: &PinsSection, simulate: bool) -> SharedPins {
    let kind = if simulate {
        PinBackendKind::Simulated
    } else {
        section.backend
    };

    let pins: SharedPins = match kind {
        PinBackendKind::Sysfs => Arc::new(SysfsPinBackend::new(
            &section.gpio_base_path,
            &section.analog_base_path,
        )),
        PinBackendKind::Simulated => Arc::new(SimulatedPinBackend::new()),
        PinBackendKind::Null => Arc::new(NullPinBackend),
    };
    info!("Pin backend: {}", pins.name());
    pins
}
