//! Build the coordinator's device list from configuration

use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use iosync_core::{
    AnalogInput, Clock, Device, DigitalInput, Heartbeat, Relay, RelayMode, SafeStatePolicy,
    SafetyCoordinator, SharedPins, Variable,
};
use tracing::{info, warn};

use crate::config::{DeviceConfig, IoSrvConfig, RelayModeConfig, VariableSource};

/// Shared counter the `cycle_count` variable reads from
pub type CycleCounter = Arc<AtomicU64>;

pub struct Wiring {
    pub coordinator: SafetyCoordinator,
    pub cycles: CycleCounter,
}

pub fn build_coordinator(config: &IoSrvConfig, pins: &SharedPins, clock: Arc<dyn Clock>) -> Wiring {
    let cycles = CycleCounter::default();
    let mut coordinator = SafetyCoordinator::new(config.modbus.offsets)
        .with_fault_register(config.modbus.fault_register);

    for (i, device) in config.devices.iter().enumerate() {
        let device = build_device(config, device, i, pins, &clock, &cycles);
        coordinator.register(device);
    }
    info!("Wired {} devices", coordinator.len());

    Wiring {
        coordinator,
        cycles,
    }
}

fn build_device(
    config: &IoSrvConfig,
    device: &DeviceConfig,
    index: usize,
    pins: &SharedPins,
    clock: &Arc<dyn Clock>,
    cycles: &CycleCounter,
) -> Device {
    match device {
        DeviceConfig::Relay {
            pin,
            led_pin,
            mode,
            on_enter,
            on_leave,
            max_on_ms,
        } => {
            let mode = match mode {
                RelayModeConfig::Stable => RelayMode::Stable,
                RelayModeConfig::SelfResetting => RelayMode::SelfResetting {
                    max_on_ms: max_on_ms.unwrap_or(config.relay_max_on_ms),
                },
            };
            let mut relay = Relay::new(Arc::clone(pins), *pin, mode)
                .with_policy(SafeStatePolicy::new(*on_enter, *on_leave));
            if let Some(led) = led_pin {
                relay = relay.with_led(*led);
            }
            relay.into()
        },
        DeviceConfig::DigitalInput { pin, reverse } => {
            DigitalInput::new(Arc::clone(pins), *pin).reversed(*reverse).into()
        },
        DeviceConfig::AnalogInput { pin } => AnalogInput::new(Arc::clone(pins), *pin).into(),
        DeviceConfig::Variable { source, initial } => match source {
            VariableSource::Scratch => {
                let cell = Arc::new(AtomicU16::new(initial.unwrap_or(0)));
                let writer = Arc::clone(&cell);
                Variable::read_write(
                    move || cell.load(Ordering::Relaxed),
                    move |v: u16| writer.store(v, Ordering::Relaxed),
                )
                .into()
            },
            VariableSource::UptimeSeconds => {
                let clock = Arc::clone(clock);
                Variable::read_only(move || clock.now_ms() / 1000).into()
            },
            VariableSource::CycleCount => {
                let cycles = Arc::clone(cycles);
                Variable::read_only(move || cycles.load(Ordering::Relaxed)).into()
            },
        },
        DeviceConfig::Heartbeat {
            timeout_ms,
            drives_safe_state,
        } => {
            let heartbeat = Heartbeat::new(timeout_ms.unwrap_or(config.heartbeat.timeout_ms))
                .with_observer(move |alive| {
                    if alive {
                        info!("Heartbeat {} refreshed by client", index);
                    } else {
                        warn!("Heartbeat {} timed out", index);
                    }
                });
            if *drives_safe_state {
                heartbeat.into()
            } else {
                heartbeat.detached().into()
            }
        },
    }
}
