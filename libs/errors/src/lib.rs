//! Unified error handling for the iosync workspace
//!
//! Every crate in the workspace returns [`IoSyncError`]. Runtime collaborator
//! failures (pins, transport) are recorded as fault bits by the core and never
//! abort the control loop; only configuration errors stop a service at startup.

use thiserror::Error;

// ============================================================================
// IoSyncError - Main error type
// ============================================================================

/// Main error type for all iosync crates
#[derive(Debug, Error)]
pub enum IoSyncError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Device & Pin Errors
    // ======================================
    #[error("Pin {pin}: {reason}")]
    Pin { pin: u32, reason: String },

    #[error("Device setup failed at index {index}: {reason}")]
    DeviceSetup { index: usize, reason: String },

    // ======================================
    // Transport Errors
    // ======================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Register address out of range: {space} {address}")]
    AddressOutOfRange { space: String, address: u16 },

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ======================================
    // Runtime Errors
    // ======================================
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type alias using IoSyncError
pub type Result<T> = std::result::Result<T, IoSyncError>;

impl IoSyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn pin(pin: u32, reason: impl Into<String>) -> Self {
        Self::Pin {
            pin,
            reason: reason.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Check if this error must stop a service during startup
    ///
    /// Collaborator errors (pins, transport) are survivable: the core reports
    /// them through fault bits and keeps cycling.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InvalidConfig { .. } | Self::Logging(_)
        )
    }
}
