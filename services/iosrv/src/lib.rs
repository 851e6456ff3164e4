//! iosrv - I/O synchronization service
//!
//! Exposes relays, inputs, variables and a client heartbeat as Modbus TCP
//! registers, and drives every output to its configured safe state when the
//! link drops, the transport fails or the client heartbeat goes stale.

pub mod config;
pub mod devices;
pub mod gpio;
pub mod link;
pub mod runtime;
pub mod transport;

pub use config::IoSrvConfig;
pub use runtime::ControlLoop;

pub const SERVICE_NAME: &str = "iosrv";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
