//! Error types for the head unit session layer.
//!
//! Every fault that crosses a component boundary is expressed as an
//! `AutoAppError`. Nothing in this crate panics on a peer or driver failure;
//! errors either become a failed protocol response or a return to discovery.

use thiserror::Error;

/// Main error type for the session layer.
#[derive(Error, Debug)]
pub enum AutoAppError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Operation aborted")]
   OperationAborted,

   #[error("Operation in progress")]
   OperationInProgress,

   #[error("Heartbeat missed")]
   HeartbeatMissed,

   #[error("Channel closed")]
   ChannelClosed,

   #[error("Transport error: {0}")]
   Transport(String),

   #[error("Driver error: {0}")]
   Driver(String),

   #[error("Device not found")]
   DeviceNotFound,

   #[error("Invalid configuration: {0}")]
   InvalidConfig(String),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("Supervisor has been shut down")]
   SupervisorShutdown,
}

impl AutoAppError {
   /// True for a cancellation the caller asked for itself.
   pub const fn is_aborted(&self) -> bool {
      matches!(self, Self::OperationAborted)
   }
}

/// Convenience type alias for Results with `AutoAppError`.
pub type Result<T> = std::result::Result<T, AutoAppError>;
