//! Liveness monitor
//!
//! The supervising peer proves it is alive by writing the heartbeat holding
//! register. Only a *changed* value reaches the device (bindings suppress
//! unchanged pulls), so peers must write a toggling or counting value.

use tracing::{info, warn};

use super::{CycleContext, DeviceEvent, IoDevice};
use crate::clock::Millis;
use crate::register::RegisterKind;

type Observer = Box<dyn FnMut(bool) + Send>;

pub struct Heartbeat {
    timeout_ms: Millis,
    is_alive: bool,
    last_refresh: Millis,
    value: u16,
    now: Millis,
    drives_safe_state: bool,
    observer: Option<Observer>,
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("timeout_ms", &self.timeout_ms)
            .field("is_alive", &self.is_alive)
            .field("last_refresh", &self.last_refresh)
            .field("drives_safe_state", &self.drives_safe_state)
            .finish_non_exhaustive()
    }
}

impl Heartbeat {
    /// Monitor that reports transitions to the coordinator
    pub fn new(timeout_ms: Millis) -> Self {
        Self {
            timeout_ms,
            is_alive: false,
            last_refresh: 0,
            value: 0,
            now: 0,
            drives_safe_state: true,
            observer: None,
        }
    }

    /// Keep transitions local instead of feeding the safe-state machine
    pub fn detached(mut self) -> Self {
        self.drives_safe_state = false;
        self
    }

    pub fn drives_safe_state(&self) -> bool {
        self.drives_safe_state
    }

    /// Callback receiving the new alive flag on every transition
    pub fn with_observer(mut self, observer: impl FnMut(bool) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    pub fn last_refresh(&self) -> Millis {
        self.last_refresh
    }

    pub fn timeout_ms(&self) -> Millis {
        self.timeout_ms
    }

    fn transition(&mut self, alive: bool, ctx: &mut CycleContext) {
        self.is_alive = alive;
        if alive {
            info!("Heartbeat alive");
        } else {
            warn!(
                "Heartbeat lost: no refresh for {} ms",
                self.now.saturating_sub(self.last_refresh)
            );
        }
        if self.drives_safe_state {
            ctx.emit(DeviceEvent::Liveness { alive });
        }
        if let Some(observer) = self.observer.as_mut() {
            observer(alive);
        }
    }
}

impl IoDevice for Heartbeat {
    fn kind(&self) -> RegisterKind {
        RegisterKind::HoldingRegister
    }

    fn update(&mut self, ctx: &mut CycleContext) {
        self.now = ctx.now;
        let expired = self.now.saturating_sub(self.last_refresh) > self.timeout_ms;
        if expired == self.is_alive {
            self.transition(!expired, ctx);
        }
    }

    fn holding(&self) -> u16 {
        self.value
    }

    fn set_holding(&mut self, value: u16) {
        self.value = value;
        self.last_refresh = self.now;
    }
}
