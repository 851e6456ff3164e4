//! Safe-state scenarios
//!
//! End-to-end runs of the coordinator against an in-memory register map:
//! - heartbeat loss with relays under different policies
//! - combined link and liveness faults
//! - self-resetting relays driven only by time

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;

use iosync_core::{
    Clock, FaultCause, Heartbeat, IoDevice, LinkState, ManualClock, MemoryRegisterMap, RegisterMap,
    RegisterOffsets, Relay, SafeAction, SafeStatePolicy, SafetyCoordinator, SimulatedPinBackend,
};

const DEADLINE: u64 = 300_000;
const RELAY_PIN: u32 = 1;
const HEARTBEAT_ADDR: u16 = 40_001;

struct Rig {
    pins: Arc<SimulatedPinBackend>,
    map: MemoryRegisterMap,
    coordinator: SafetyCoordinator,
    clock: ManualClock,
}

impl Rig {
    /// Relay at index 0, heartbeat at index 1
    fn new(policy: SafeStatePolicy) -> Self {
        let pins = Arc::new(SimulatedPinBackend::new());
        let mut coordinator = SafetyCoordinator::new(RegisterOffsets::default());
        coordinator.register(Relay::stable(pins.clone(), RELAY_PIN).with_policy(policy));
        coordinator.register(Heartbeat::new(DEADLINE));

        let mut map = MemoryRegisterMap::new();
        coordinator.setup(&mut map);
        Self {
            pins,
            map,
            coordinator,
            clock: ManualClock::new(0),
        }
    }

    fn cycle_at(&mut self, now: u64) {
        self.clock.set(now);
        self.coordinator.run_cycle(&mut self.map, self.clock.now_ms());
    }

    fn relay_on(&self) -> bool {
        self.coordinator.device(0).unwrap().coil()
    }
}

// ============================================================================
// Heartbeat loss
// ============================================================================

#[test]
fn test_restore_relay_untouched_on_heartbeat_loss() {
    let mut rig = Rig::new(SafeStatePolicy::uniform(SafeAction::Restore));

    rig.map.write_coil(0, true);
    rig.cycle_at(0);
    assert!(rig.relay_on());
    assert!(!rig.coordinator.is_safe_state());

    rig.cycle_at(310_000);
    assert!(rig.coordinator.is_safe_state());
    assert!(rig.coordinator.state().faults().contains(FaultCause::HeartbeatLost));
    // Restore does not force a level on entry
    assert!(rig.relay_on());
    assert!(rig.coordinator.device(0).unwrap().in_safe_state());
}

#[test]
fn test_force_off_relay_restored_after_heartbeat_returns() {
    let mut rig = Rig::new(SafeStatePolicy::new(SafeAction::ForceOff, SafeAction::Restore));

    rig.map.write_coil(0, true);
    rig.cycle_at(0);
    assert_eq!(rig.pins.level(RELAY_PIN), Some(true));

    rig.cycle_at(310_000);
    assert!(rig.coordinator.is_safe_state());
    assert!(!rig.relay_on());
    assert_eq!(rig.pins.level(RELAY_PIN), Some(false));
    assert!(!rig.map.read_coil(0));

    // Refresh lands on the pull of this cycle, liveness flips on the next
    rig.map.write_holding(HEARTBEAT_ADDR, 1);
    rig.cycle_at(310_100);
    assert!(rig.coordinator.is_safe_state());
    rig.cycle_at(310_200);
    assert!(!rig.coordinator.is_safe_state());
    assert!(rig.relay_on());
    assert!(rig.map.read_coil(0));
}

#[test]
fn test_unchanged_heartbeat_write_does_not_refresh() {
    let mut rig = Rig::new(SafeStatePolicy::uniform(SafeAction::ForceOff));

    rig.map.write_holding(HEARTBEAT_ADDR, 5);
    rig.cycle_at(100_000);
    // Same value again: suppressed, so the deadline still counts from 100 000
    rig.map.write_holding(HEARTBEAT_ADDR, 5);
    rig.cycle_at(400_000);
    assert!(!rig.coordinator.is_safe_state());
    rig.cycle_at(400_001);
    assert!(rig.coordinator.is_safe_state());

    rig.map.write_holding(HEARTBEAT_ADDR, 6);
    rig.cycle_at(400_002);
    rig.cycle_at(400_003);
    assert!(!rig.coordinator.is_safe_state());
}

// ============================================================================
// Combined causes
// ============================================================================

#[test]
fn test_exit_requires_link_and_liveness() {
    let mut rig = Rig::new(SafeStatePolicy::uniform(SafeAction::ForceOff));
    rig.cycle_at(0);

    rig.coordinator.apply_link_state(LinkState::Down);
    assert!(rig.coordinator.is_safe_state());
    rig.cycle_at(DEADLINE + 1);
    assert!(rig.coordinator.is_safe_state());

    // Liveness back first: link still blocks
    rig.map.write_holding(HEARTBEAT_ADDR, 1);
    rig.cycle_at(DEADLINE + 2);
    rig.cycle_at(DEADLINE + 3);
    assert!(!rig.coordinator.state().faults().contains(FaultCause::HeartbeatLost));
    assert!(rig.coordinator.is_safe_state());

    rig.coordinator.apply_link_state(LinkState::Up);
    assert!(!rig.coordinator.is_safe_state());
}

#[test]
fn test_exit_requires_liveness_when_link_recovers_first() {
    let mut rig = Rig::new(SafeStatePolicy::uniform(SafeAction::ForceOff));
    rig.cycle_at(0);
    rig.cycle_at(DEADLINE + 1);
    assert!(rig.coordinator.is_safe_state());

    rig.coordinator.apply_link_state(LinkState::Down);
    rig.coordinator.apply_link_state(LinkState::Up);
    assert!(rig.coordinator.is_safe_state());

    rig.map.write_holding(HEARTBEAT_ADDR, 9);
    rig.cycle_at(DEADLINE + 2);
    rig.cycle_at(DEADLINE + 3);
    assert!(!rig.coordinator.is_safe_state());
}

#[test]
fn test_protocol_init_failure_drives_safe_state() {
    let mut rig = Rig::new(SafeStatePolicy::uniform(SafeAction::ForceOff));
    rig.map.write_coil(0, true);
    rig.cycle_at(0);

    rig.coordinator.report_protocol_init(false);
    assert!(rig.coordinator.is_safe_state());
    assert!(!rig.relay_on());

    rig.coordinator.report_protocol_init(true);
    assert!(!rig.coordinator.is_safe_state());
    // ForceOff on leave as well
    assert!(!rig.relay_on());
}

// ============================================================================
// Idempotence and restore round trips
// ============================================================================

#[test]
fn test_repeated_entry_matches_single_entry() {
    for action in [
        SafeAction::Ignore,
        SafeAction::ForceOn,
        SafeAction::ForceOff,
        SafeAction::Restore,
    ] {
        for initial in [false, true] {
            let pins = Arc::new(SimulatedPinBackend::new());
            let policy = SafeStatePolicy::uniform(action);
            let mut once = Relay::stable(pins.clone(), 1).with_policy(policy);
            let mut twice = Relay::stable(pins, 2).with_policy(policy);
            once.set_coil(initial);
            twice.set_coil(initial);

            once.enter_safe_state();
            twice.enter_safe_state();
            twice.enter_safe_state();
            assert_eq!(once.coil(), twice.coil(), "{} from {}", action, initial);

            once.leave_safe_state();
            twice.leave_safe_state();
            twice.leave_safe_state();
            assert_eq!(once.coil(), twice.coil(), "{} from {}", action, initial);
        }
    }
}

#[test]
fn test_restore_round_trip_over_toggles() {
    for initial in [false, true] {
        let pins = Arc::new(SimulatedPinBackend::new());
        let mut relay = Relay::stable(pins, 1)
            .with_policy(SafeStatePolicy::new(SafeAction::ForceOn, SafeAction::Restore));
        relay.set_coil(initial);
        for _ in 0..3 {
            relay.enter_safe_state();
            relay.enter_safe_state();
            relay.leave_safe_state();
            assert_eq!(relay.coil(), initial);
        }
    }
}

// ============================================================================
// Self-resetting outputs
// ============================================================================

#[test]
fn test_self_resetting_relay_in_cycle() {
    let pins = Arc::new(SimulatedPinBackend::new());
    let mut coordinator = SafetyCoordinator::new(RegisterOffsets::default());
    coordinator.register(Relay::self_resetting(pins.clone(), 3, DEADLINE));
    let mut map = MemoryRegisterMap::new();
    coordinator.setup(&mut map);

    map.write_coil(0, true);
    coordinator.run_cycle(&mut map, 0);
    assert_eq!(map.read_holding(40_000), 300);

    for now in [1, 150_000, 299_999, 300_000] {
        coordinator.run_cycle(&mut map, now);
        assert!(map.read_coil(0), "still asserted at {}", now);
    }
    coordinator.run_cycle(&mut map, 300_001);
    assert!(!map.read_coil(0));
    assert_eq!(pins.level(3), Some(false));

    // Shortening the window through the holding register
    map.write_holding(40_000, 10);
    map.write_coil(0, true);
    coordinator.run_cycle(&mut map, 400_000);
    assert!(map.read_coil(0));
    coordinator.run_cycle(&mut map, 410_001);
    assert!(!map.read_coil(0));
}
