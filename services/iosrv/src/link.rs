//! Network link health
//!
//! The link monitor reports the physical interface; the runtime folds in
//! transport health before handing the result to the coordinator.

use std::path::PathBuf;

use iosync_core::LinkState;
use tracing::debug;

pub trait LinkMonitor: Send {
    fn poll(&mut self) -> LinkState;
}

/// Monitor for deployments without a dedicated interface
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysUp;

impl LinkMonitor for AlwaysUp {
    fn poll(&mut self) -> LinkState {
        LinkState::Up
    }
}

/// Reads `/sys/class/net/<iface>/operstate`
#[derive(Debug, Clone)]
pub struct SysfsLinkMonitor {
    operstate: PathBuf,
}

impl SysfsLinkMonitor {
    pub fn new(interface: &str) -> Self {
        Self::with_base("/sys/class/net", interface)
    }

    pub fn with_base(base: impl Into<PathBuf>, interface: &str) -> Self {
        Self {
            operstate: base.into().join(interface).join("operstate"),
        }
    }
}

impl LinkMonitor for SysfsLinkMonitor {
    fn poll(&mut self) -> LinkState {
        match std::fs::read_to_string(&self.operstate) {
            Ok(state) => match state.trim() {
                "up" => LinkState::Up,
                "down" | "notpresent" | "lowerlayerdown" => LinkState::Down,
                // dormant, testing, unknown: carrier is settling
                other => {
                    debug!("Interface operstate {}", other);
                    LinkState::Recovering
                },
            },
            Err(e) => {
                debug!("Cannot read {}: {}", self.operstate.display(), e);
                LinkState::Down
            },
        }
    }
}

/// Pick the monitor for an optional interface name
pub fn monitor_for(interface: Option<&str>) -> Box<dyn LinkMonitor> {
    match interface {
        Some(iface) => Box::new(SysfsLinkMonitor::new(iface)),
        None => Box::new(AlwaysUp),
    }
}

/// Combine interface and transport health
pub fn effective_link(interface: LinkState, transport_alive: bool) -> LinkState {
    if transport_alive {
        interface
    } else {
        LinkState::Down
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_operstate_mapping() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("eth0")).unwrap();
        let state_file = dir.path().join("eth0/operstate");
        let mut monitor = SysfsLinkMonitor::with_base(dir.path(), "eth0");

        std::fs::write(&state_file, "up\n").unwrap();
        assert_eq!(monitor.poll(), LinkState::Up);
        std::fs::write(&state_file, "down\n").unwrap();
        assert_eq!(monitor.poll(), LinkState::Down);
        std::fs::write(&state_file, "dormant\n").unwrap();
        assert_eq!(monitor.poll(), LinkState::Recovering);
    }

    #[test]
    fn test_missing_interface_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = SysfsLinkMonitor::with_base(dir.path(), "wlan9");
        assert_eq!(monitor.poll(), LinkState::Down);
    }

    #[test]
    fn test_dead_transport_forces_down() {
        assert_eq!(effective_link(LinkState::Up, false), LinkState::Down);
        assert_eq!(effective_link(LinkState::Recovering, true), LinkState::Recovering);
        assert_eq!(monitor_for(None).poll(), LinkState::Up);
    }
}
