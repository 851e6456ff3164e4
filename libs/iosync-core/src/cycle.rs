//! Elapsed-time gating for periodic work

use crate::clock::Millis;

/// Runs work at most once per period, measured against the last run
///
/// The first poll is always due.
#[derive(Debug, Clone, Copy)]
pub struct CycleGate {
    period_ms: Millis,
    last_run: Option<Millis>,
}

impl CycleGate {
    pub fn new(period_ms: Millis) -> Self {
        Self {
            period_ms,
            last_run: None,
        }
    }

    pub fn period_ms(&self) -> Millis {
        self.period_ms
    }

    /// Check the gate and record a run when due
    pub fn poll(&mut self, now: Millis) -> bool {
        let due = match self.last_run {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.period_ms,
        };
        if due {
            self.last_run = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_run = None;
    }
}
