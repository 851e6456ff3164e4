//! Control loop: link checks, sync cycles, status LEDs
//!
//! One task owns the coordinator. Every `poll_interval_ms` it checks two
//! gates: the link gate (transport restart, interface + transport health,
//! LED refresh) and the sync gate (one coordinator cycle under the
//! register-map lock).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use errors::Result;
use iosync_core::{
    Clock, CycleGate, MemoryRegisterMap, MonotonicClock, SafetyCoordinator, SharedPins,
    StatusLeds,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IoSrvConfig;
use crate::devices::{build_coordinator, CycleCounter, Wiring};
use crate::gpio::build_pins;
use crate::link::{effective_link, monitor_for, LinkMonitor};
use crate::transport::{ModbusTransport, SharedRegisterMap};

pub struct ControlLoop {
    coordinator: SafetyCoordinator,
    map: SharedRegisterMap,
    clock: Arc<dyn Clock>,
    cycles: CycleCounter,
    link: Box<dyn LinkMonitor>,
    leds: Option<StatusLeds>,
    transport: Option<ModbusTransport>,
    /// Modbus bind address; `None` when the transport is disabled
    bind_address: Option<String>,
    link_gate: CycleGate,
    sync_gate: CycleGate,
    poll_interval: Duration,
}

impl ControlLoop {
    /// Build everything from configuration with the configured pin backend
    pub async fn from_config(config: &IoSrvConfig, simulate: bool) -> Result<Self> {
        let pins = build_pins(&config.pins, simulate);
        Self::assemble(config, pins, Arc::new(MonotonicClock::new())).await
    }

    /// Build with caller-supplied pins and clock
    ///
    /// Startup order: wire devices, report expansion presence, set up the
    /// register map and devices, light the status LEDs, start the transport.
    pub async fn assemble(
        config: &IoSrvConfig,
        pins: SharedPins,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let Wiring {
            mut coordinator,
            cycles,
        } = build_coordinator(config, &pins, Arc::clone(&clock));

        let present = pins.is_available();
        if !present {
            warn!("Pin backend {} reports no expansion hardware", pins.name());
        }
        coordinator.report_expansion(present);

        let map: SharedRegisterMap = Arc::new(Mutex::new(MemoryRegisterMap::new()));
        coordinator.setup(&mut *map.lock());

        let leds = match &config.status_leds {
            Some(section) => {
                let mut leds = StatusLeds::new(Arc::clone(&pins), section.green_pin, section.red_pin);
                if let Err(e) = leds.setup() {
                    warn!("Status LED setup failed: {}", e);
                }
                Some(leds)
            },
            None => None,
        };

        let bind_address = config.modbus.enabled.then(|| config.modbus.bind_address());
        if bind_address.is_none() {
            info!("Modbus transport disabled");
        }

        let mut control = Self {
            coordinator,
            map,
            clock,
            cycles,
            link: monitor_for(config.link.interface.as_deref()),
            leds,
            transport: None,
            bind_address,
            link_gate: CycleGate::new(config.service.link_check_interval_ms),
            sync_gate: CycleGate::new(config.service.cycle_period_ms),
            poll_interval: Duration::from_millis(config.service.poll_interval_ms),
        };
        control.ensure_transport().await;
        Ok(control)
    }

    pub fn with_link_monitor(mut self, link: Box<dyn LinkMonitor>) -> Self {
        self.link = link;
        self
    }

    pub fn coordinator(&self) -> &SafetyCoordinator {
        &self.coordinator
    }

    pub fn register_map(&self) -> SharedRegisterMap {
        Arc::clone(&self.map)
    }

    pub fn transport(&self) -> Option<&ModbusTransport> {
        self.transport.as_ref()
    }

    /// Start the Modbus server if it is enabled and not running
    ///
    /// A failed start keeps ProtocolInitFailure raised; the next link check
    /// retries.
    async fn ensure_transport(&mut self) {
        let Some(bind) = self.bind_address.as_deref() else {
            return;
        };
        if self.transport.as_ref().is_some_and(ModbusTransport::is_alive) {
            return;
        }
        if self.transport.take().is_some() {
            warn!("Modbus server task stopped, restarting");
        }

        match ModbusTransport::start(bind, Arc::clone(&self.map)).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.coordinator.report_protocol_init(true);
            },
            Err(e) => {
                if self.coordinator.report_protocol_init(false) {
                    error!("Modbus transport failed to start: {}", e);
                } else {
                    debug!("Modbus transport retry failed: {}", e);
                }
            },
        }
    }

    /// Run whatever work is due at the current clock reading
    pub async fn tick(&mut self) {
        let now = self.clock.now_ms();

        if self.link_gate.poll(now) {
            self.ensure_transport().await;
            let transport_alive = self.transport.as_ref().map_or(true, ModbusTransport::is_alive);
            let link = effective_link(self.link.poll(), transport_alive);
            debug!("Link check: {}", link);
            self.coordinator.apply_link_state(link);
            if let Some(leds) = self.leds.as_mut() {
                leds.refresh(self.coordinator.state());
            }
        }

        if self.sync_gate.poll(now) {
            self.coordinator.run_cycle(&mut *self.map.lock(), now);
            self.cycles
                .store(self.coordinator.state().cycles(), Ordering::Relaxed);
        }
    }

    /// Tick until cancelled, then park every device in safe state
    pub async fn run(mut self, token: CancellationToken) {
        info!(
            "Control loop started: cycle {} ms, link check {} ms",
            self.sync_gate.period_ms(),
            self.link_gate.period_ms()
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        info!("Control loop stopping, entering safe state");
        self.coordinator.hold_safe_state();
        if let Some(leds) = self.leds.as_mut() {
            leds.refresh(self.coordinator.state());
        }
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use iosync_core::{FaultCause, LinkState, ManualClock, RegisterMap, SimulatedPinBackend};

    use super::*;

    struct ScriptedLink(Arc<Mutex<LinkState>>);

    impl LinkMonitor for ScriptedLink {
        fn poll(&mut self) -> LinkState {
            *self.0.lock()
        }
    }

    const YAML: &str = r#"
service:
  cycle_period_ms: 100
  link_check_interval_ms: 500
modbus:
  enabled: false
status_leds:
  green_pin: 20
  red_pin: 21
devices:
  - type: relay
    pin: 4
    on_enter: force_off
    on_leave: restore
  - type: heartbeat
    timeout_ms: 1000
"#;

    async fn build_with(
        config: &IoSrvConfig,
    ) -> (ControlLoop, Arc<SimulatedPinBackend>, ManualClock, Arc<Mutex<LinkState>>) {
        let pins = Arc::new(SimulatedPinBackend::new());
        let clock = ManualClock::new(0);
        let link = Arc::new(Mutex::new(LinkState::Up));
        let control = ControlLoop::assemble(config, pins.clone(), Arc::new(clock.clone()))
            .await
            .unwrap()
            .with_link_monitor(Box::new(ScriptedLink(Arc::clone(&link))));
        (control, pins, clock, link)
    }

    async fn build() -> (ControlLoop, Arc<SimulatedPinBackend>, ManualClock, Arc<Mutex<LinkState>>) {
        build_with(&IoSrvConfig::from_yaml_str(YAML).unwrap()).await
    }

    #[tokio::test]
    async fn test_sync_gate_limits_cycles() {
        let (mut control, _pins, clock, _link) = build().await;
        control.tick().await;
        assert_eq!(control.coordinator().state().cycles(), 1);
        clock.set(50);
        control.tick().await;
        assert_eq!(control.coordinator().state().cycles(), 1);
        clock.set(100);
        control.tick().await;
        assert_eq!(control.coordinator().state().cycles(), 2);
    }

    #[tokio::test]
    async fn test_link_down_enters_safe_state() {
        let (mut control, pins, clock, link) = build().await;
        let map = control.register_map();
        map.lock().write_coil(0, true);
        control.tick().await;
        assert_eq!(pins.level(4), Some(true));
        assert_eq!(pins.level(20), Some(true));

        *link.lock() = LinkState::Down;
        clock.set(500);
        control.tick().await;
        assert!(control.coordinator().is_safe_state());
        assert!(control.coordinator().state().faults().contains(FaultCause::LinkDown));
        assert_eq!(pins.level(4), Some(false));
        assert_eq!(pins.level(20), Some(false));

        *link.lock() = LinkState::Up;
        clock.set(1000);
        control.tick().await;
        assert!(!control.coordinator().is_safe_state());
        assert_eq!(pins.level(4), Some(true));
    }

    #[tokio::test]
    async fn test_shutdown_holds_safe_state() {
        let (mut control, pins, _clock, _link) = build().await;
        control.register_map().lock().write_coil(0, true);
        control.tick().await;
        assert_eq!(pins.level(4), Some(true));
        control.shutdown();
        assert!(control.coordinator().is_safe_state());
        assert_eq!(pins.level(4), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let (control, _pins, _clock, _link) = build().await;
        let token = CancellationToken::new();
        let handle = tokio::spawn(control.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_restarts_after_bind_failure() {
        let squatter = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = squatter.local_addr().unwrap().port();
        let mut config = IoSrvConfig::from_yaml_str(YAML).unwrap();
        config.modbus.enabled = true;
        config.modbus.address = "127.0.0.1".to_string();
        config.modbus.port = port;

        let (mut control, _pins, clock, _link) = build_with(&config).await;
        assert!(control.transport().is_none());
        assert!(control.coordinator().is_safe_state());

        // Port still taken: the retry fails and safe state holds
        control.tick().await;
        assert!(control.transport().is_none());
        assert!(control
            .coordinator()
            .state()
            .faults()
            .contains(FaultCause::ProtocolInitFailure));

        drop(squatter);
        clock.set(500);
        control.tick().await;
        assert!(control.transport().is_some_and(ModbusTransport::is_alive));
        assert_eq!(control.transport().unwrap().local_addr().port(), port);
        assert!(control.coordinator().state().faults().is_empty());
        assert!(!control.coordinator().is_safe_state());
    }

    #[tokio::test]
    async fn test_dead_server_task_is_restarted() {
        let mut config = IoSrvConfig::from_yaml_str(YAML).unwrap();
        config.modbus.enabled = true;
        config.modbus.address = "127.0.0.1".to_string();
        config.modbus.port = 0;

        let (mut control, _pins, clock, _link) = build_with(&config).await;
        control.tick().await;
        assert!(!control.coordinator().is_safe_state());

        control.transport().unwrap().shutdown();
        while control.transport().unwrap().is_alive() {
            tokio::task::yield_now().await;
        }

        clock.set(500);
        control.tick().await;
        assert!(control.transport().is_some_and(ModbusTransport::is_alive));
        assert!(!control.coordinator().is_safe_state());
        assert!(control.coordinator().state().faults().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_transport_never_starts() {
        let (mut control, _pins, clock, _link) = build().await;
        control.tick().await;
        clock.set(500);
        control.tick().await;
        assert!(control.transport().is_none());
        assert!(!control.coordinator().is_safe_state());
    }
}
