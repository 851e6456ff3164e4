//! Shared service plumbing for iosync services
//!
//! - logging setup with runtime level changes
//! - shutdown signal handling
//! - command-line arguments
//! - single-setting env/config fallback helpers

pub mod bootstrap_args;
pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use bootstrap_args::ServiceArgs;
