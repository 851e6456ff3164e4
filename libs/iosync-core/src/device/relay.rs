//! Relay outputs
//!
//! A relay is a coil-backed digital output with a [`SafeStatePolicy`]. The
//! self-resetting flavour additionally switches itself off once it has been
//! asserted for longer than `max_on_ms`, and exposes that duration (in
//! seconds) on its holding register.

use errors::Result;
use tracing::{debug, warn};

use super::{CycleContext, IoDevice, SafeAction, SafeStatePolicy};
use crate::clock::Millis;
use crate::pin::{PinMode, SharedPins};
use crate::register::{RegisterKind, INVALID_VALUE};

/// Auto-off behaviour of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Plain output, no auto-off
    Stable,
    /// Forced off after being asserted for more than `max_on_ms`
    SelfResetting { max_on_ms: Millis },
}

pub struct Relay {
    pins: SharedPins,
    pin: u32,
    led_pin: Option<u32>,
    mode: RelayMode,
    policy: SafeStatePolicy,
    state: bool,
    asserted_at: Option<Millis>,
    saved_state: bool,
    in_safe_state: bool,
    now: Millis,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("pin", &self.pin)
            .field("led_pin", &self.led_pin)
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("in_safe_state", &self.in_safe_state)
            .finish_non_exhaustive()
    }
}

impl Relay {
    pub fn new(pins: SharedPins, pin: u32, mode: RelayMode) -> Self {
        Self {
            pins,
            pin,
            led_pin: None,
            mode,
            policy: SafeStatePolicy::default(),
            state: false,
            asserted_at: None,
            saved_state: false,
            in_safe_state: false,
            now: 0,
        }
    }

    pub fn stable(pins: SharedPins, pin: u32) -> Self {
        Self::new(pins, pin, RelayMode::Stable)
    }

    pub fn self_resetting(pins: SharedPins, pin: u32, max_on_ms: Millis) -> Self {
        Self::new(pins, pin, RelayMode::SelfResetting { max_on_ms })
    }

    /// Mirror the output on an indicator LED
    pub fn with_led(mut self, led_pin: u32) -> Self {
        self.led_pin = Some(led_pin);
        self
    }

    pub fn with_policy(mut self, policy: SafeStatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn led_pin(&self) -> Option<u32> {
        self.led_pin
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    pub fn policy(&self) -> SafeStatePolicy {
        self.policy
    }

    pub fn is_on(&self) -> bool {
        self.state
    }

    pub fn on(&mut self) {
        self.drive(true);
        self.state = true;
        if matches!(self.mode, RelayMode::SelfResetting { .. }) {
            self.asserted_at = Some(self.now);
        }
        self.flush();
        debug!("Relay on: pin {}", self.pin);
    }

    pub fn off(&mut self) {
        self.drive(false);
        self.state = false;
        self.asserted_at = None;
        self.flush();
        debug!("Relay off: pin {}", self.pin);
    }

    fn drive(&self, level: bool) {
        if let Err(e) = self.pins.write(self.pin, level) {
            warn!("Relay pin {} write failed: {}", self.pin, e);
        }
        if let Some(led) = self.led_pin {
            if let Err(e) = self.pins.write(led, level) {
                warn!("Relay LED pin {} write failed: {}", led, e);
            }
        }
    }

    fn flush(&self) {
        if let Err(e) = self.pins.flush() {
            warn!("Pin backend {} flush failed: {}", self.pins.name(), e);
        }
    }

    fn apply(&mut self, action: SafeAction) {
        match action {
            SafeAction::ForceOn => self.on(),
            SafeAction::ForceOff => self.off(),
            SafeAction::Restore => {
                if self.saved_state {
                    self.on()
                } else {
                    self.off()
                }
            },
            SafeAction::Ignore => {},
        }
    }
}

impl IoDevice for Relay {
    fn kind(&self) -> RegisterKind {
        RegisterKind::Coil
    }

    fn setup(&mut self) -> Result<()> {
        self.pins.setup(self.pin, PinMode::Output)?;
        self.pins.write(self.pin, false)?;
        if let Some(led) = self.led_pin {
            self.pins.setup(led, PinMode::Output)?;
            self.pins.write(led, false)?;
        }
        self.pins.flush()
    }

    fn update(&mut self, ctx: &mut CycleContext) {
        self.now = ctx.now;
        if let RelayMode::SelfResetting { max_on_ms } = self.mode {
            let expired = match self.asserted_at {
                Some(at) => self.state && self.now.saturating_sub(at) > max_on_ms,
                None => false,
            };
            if expired {
                self.off();
                debug!("Relay auto-off: pin {}", self.pin);
            }
        }
        self.flush();
    }

    fn coil(&self) -> bool {
        self.state
    }

    fn set_coil(&mut self, value: bool) {
        if value {
            self.on();
        } else {
            self.off();
        }
    }

    /// Max-on duration in whole seconds for self-resetting relays
    fn holding(&self) -> u16 {
        match self.mode {
            RelayMode::SelfResetting { max_on_ms } => (max_on_ms / 1000).min(u16::MAX as u64) as u16,
            RelayMode::Stable => INVALID_VALUE,
        }
    }

    fn set_holding(&mut self, value: u16) {
        if let RelayMode::SelfResetting { max_on_ms } = &mut self.mode {
            *max_on_ms = value as Millis * 1000;
        }
    }

    fn enter_safe_state(&mut self) {
        if self.in_safe_state || self.policy.on_enter == SafeAction::Ignore {
            return;
        }
        debug!(
            "Relay pin {} entering safe state ({}), saving {}",
            self.pin, self.policy.on_enter, self.state
        );
        self.in_safe_state = true;
        self.saved_state = self.state;
        match self.policy.on_enter {
            SafeAction::ForceOn => self.on(),
            SafeAction::ForceOff => self.off(),
            SafeAction::Restore | SafeAction::Ignore => {},
        }
    }

    fn leave_safe_state(&mut self) {
        if !self.in_safe_state {
            return;
        }
        debug!(
            "Relay pin {} leaving safe state ({}), saved {}",
            self.pin, self.policy.on_leave, self.saved_state
        );
        self.in_safe_state = false;
        self.apply(self.policy.on_leave);
    }

    fn in_safe_state(&self) -> bool {
        self.in_safe_state
    }
}
