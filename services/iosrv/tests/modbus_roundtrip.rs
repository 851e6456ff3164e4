//! End-to-end: Modbus TCP client -> register map -> devices -> pins
#![allow(clippy::disallowed_methods)]

use std::sync::Arc;

use iosrv::{ControlLoop, IoSrvConfig};
use iosync_core::{FaultCause, ManualClock, SimulatedPinBackend};
use tokio_modbus::prelude::*;

const YAML: &str = r#"
service:
  cycle_period_ms: 100
  link_check_interval_ms: 500
modbus:
  address: 127.0.0.1
  port: 0
devices:
  - type: relay
    pin: 4
    on_enter: force_off
    on_leave: restore
  - type: digital_input
    pin: 5
  - type: heartbeat
    timeout_ms: 1000
"#;

const RELAY_COIL: u16 = 0;
const INPUT_ADDR: u16 = 10001;
const HEARTBEAT_ADDR: u16 = 40002;
const FAULT_ADDR: u16 = 30003;

async fn start() -> (ControlLoop, Arc<SimulatedPinBackend>, ManualClock) {
    let config = IoSrvConfig::from_yaml_str(YAML).unwrap();
    config.validate().unwrap();
    let pins = Arc::new(SimulatedPinBackend::new());
    let clock = ManualClock::new(0);
    let control = ControlLoop::assemble(&config, pins.clone(), Arc::new(clock.clone()))
        .await
        .unwrap();
    (control, pins, clock)
}

#[tokio::test]
async fn test_client_drives_relay_and_reads_input() -> anyhow::Result<()> {
    let (mut control, pins, _clock) = start().await;
    let addr = control.transport().unwrap().local_addr();
    let mut ctx = tcp::connect(addr).await?;

    ctx.write_single_coil(RELAY_COIL, true).await??;
    pins.set_input(5, true);
    control.tick().await;

    assert_eq!(pins.level(4), Some(true));
    assert_eq!(ctx.read_discrete_inputs(INPUT_ADDR, 1).await??, vec![true]);
    assert_eq!(ctx.read_input_registers(FAULT_ADDR, 1).await??, vec![0]);
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_timeout_over_modbus() -> anyhow::Result<()> {
    let (mut control, pins, clock) = start().await;
    let addr = control.transport().unwrap().local_addr();
    let mut ctx = tcp::connect(addr).await?;

    ctx.write_single_coil(RELAY_COIL, true).await??;
    control.tick().await;
    assert_eq!(pins.level(4), Some(true));

    ctx.write_single_register(HEARTBEAT_ADDR, 1).await??;
    clock.set(500);
    control.tick().await;

    // 1100 ms since the last refresh
    clock.set(1600);
    control.tick().await;
    assert!(control.coordinator().is_safe_state());
    assert_eq!(pins.level(4), Some(false));
    let fault = ctx.read_input_registers(FAULT_ADDR, 1).await??;
    assert_eq!(fault, vec![FaultCause::HeartbeatLost.bit()]);

    // The relay was synced before the heartbeat expired; its coil follows next cycle
    clock.set(1700);
    control.tick().await;
    assert_eq!(ctx.read_coils(RELAY_COIL, 1).await??, vec![false]);

    // A changed value refreshes; liveness returns on the following cycle
    ctx.write_single_register(HEARTBEAT_ADDR, 2).await??;
    clock.set(1800);
    control.tick().await;
    assert!(control.coordinator().is_safe_state());
    clock.set(1900);
    control.tick().await;
    assert!(!control.coordinator().is_safe_state());
    assert_eq!(pins.level(4), Some(true));
    assert_eq!(ctx.read_input_registers(FAULT_ADDR, 1).await??, vec![0]);
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_request_is_rejected() -> anyhow::Result<()> {
    let (control, _pins, _clock) = start().await;
    let addr = control.transport().unwrap().local_addr();
    let mut ctx = tcp::connect(addr).await?;

    let res = ctx.read_holding_registers(HEARTBEAT_ADDR, 5).await?;
    assert_eq!(res, Err(ExceptionCode::IllegalDataAddress));
    Ok(())
}

#[tokio::test]
async fn test_bind_failure_enters_safe_state() {
    let (first, _pins, _clock) = start().await;
    let taken = first.transport().unwrap().local_addr();

    let mut config = IoSrvConfig::from_yaml_str(YAML).unwrap();
    config.modbus.port = taken.port();
    let pins = Arc::new(SimulatedPinBackend::new());
    let second = ControlLoop::assemble(&config, pins, Arc::new(ManualClock::new(0)))
        .await
        .unwrap();

    assert!(second.transport().is_none());
    assert!(second.coordinator().is_safe_state());
    assert!(second
        .coordinator()
        .state()
        .faults()
        .contains(FaultCause::ProtocolInitFailure));
}

#[test]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/iosrv.yaml");
    let config = IoSrvConfig::load(path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.devices.len(), 8);
}
