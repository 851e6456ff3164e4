//! Bit-coded fault word

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fault causes and their bit positions in the fault word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCause {
    LinkDown,
    ExpansionMissing,
    ProtocolInitFailure,
    HeartbeatLost,
    SensorFault,
    General,
}

impl FaultCause {
    pub const ALL: [FaultCause; 6] = [
        Self::LinkDown,
        Self::ExpansionMissing,
        Self::ProtocolInitFailure,
        Self::HeartbeatLost,
        Self::SensorFault,
        Self::General,
    ];

    pub fn bit(&self) -> u16 {
        let position = match self {
            Self::LinkDown => 0,
            Self::ExpansionMissing => 1,
            Self::ProtocolInitFailure => 2,
            Self::HeartbeatLost => 3,
            Self::SensorFault => 4,
            Self::General => 5,
        };
        1 << position
    }

    /// Whether this cause forces safe state while active
    pub fn drives_safe_state(&self) -> bool {
        matches!(
            self,
            Self::LinkDown | Self::ProtocolInitFailure | Self::HeartbeatLost
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkDown => "link_down",
            Self::ExpansionMissing => "expansion_missing",
            Self::ProtocolInitFailure => "protocol_init_failure",
            Self::HeartbeatLost => "heartbeat_lost",
            Self::SensorFault => "sensor_fault",
            Self::General => "general",
        }
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// OR-combined set of active fault causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultBits(u16);

impl FaultBits {
    /// Mask of causes that force safe state
    pub const SAFETY_MASK: u16 = 0b1101;

    pub fn new() -> Self {
        Self(0)
    }

    /// Set or clear one cause; returns true on an edge
    pub fn set(&mut self, cause: FaultCause, active: bool) -> bool {
        let before = self.0;
        if active {
            self.0 |= cause.bit();
        } else {
            self.0 &= !cause.bit();
        }
        before != self.0
    }

    pub fn contains(&self, cause: FaultCause) -> bool {
        self.0 & cause.bit() != 0
    }

    pub fn word(&self) -> u16 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn requires_safe_state(&self) -> bool {
        self.0 & Self::SAFETY_MASK != 0
    }

    pub fn active(&self) -> impl Iterator<Item = FaultCause> + '_ {
        FaultCause::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl fmt::Display for FaultBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.active().map(|c| c.as_str()).collect();
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_mask_matches_causes() {
        let mask = FaultCause::ALL
            .iter()
            .filter(|c| c.drives_safe_state())
            .fold(0u16, |acc, c| acc | c.bit());
        assert_eq!(mask, FaultBits::SAFETY_MASK);
    }

    #[test]
    fn test_edges_only() {
        let mut bits = FaultBits::new();
        assert!(bits.set(FaultCause::LinkDown, true));
        assert!(!bits.set(FaultCause::LinkDown, true));
        assert!(bits.set(FaultCause::ExpansionMissing, true));
        assert_eq!(bits.word(), 0b11);
        assert!(bits.set(FaultCause::LinkDown, false));
        assert!(!bits.set(FaultCause::LinkDown, false));
        assert_eq!(bits.word(), 0b10);
        assert!(!bits.requires_safe_state());
    }

    #[test]
    fn test_display() {
        let mut bits = FaultBits::new();
        assert_eq!(bits.to_string(), "none");
        bits.set(FaultCause::HeartbeatLost, true);
        bits.set(FaultCause::SensorFault, true);
        assert_eq!(bits.to_string(), "heartbeat_lost|sensor_fault");
    }
}
