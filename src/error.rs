//! Error types for the permission gateway and Bluetooth session.
//!
//! Binding failures are reported through [`GateError`]. Operations that
//! propagate failures replace the binding error with a normalized
//! [`GateError::OperationFailed`] after logging it.

use thiserror::Error;

/// Operations of the Bluetooth session façade, used to name normalized
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
   IsEnabled,
   Enable,
   StartDiscovery,
   StopDiscovery,
   Connect,
   Disconnect,
   Pair,
   Unpair,
   GetPaired,
   GetBonded,
   GetConnected,
   OpenSettings,
   Read,
   Write,
   Available,
   Clear,
}

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum GateError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("D-Bus connection error: {0}")]
   DBusConnection(#[from] zbus::fdo::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Binding error: {0}")]
   Binding(String),

   #[error("Bluetooth {0} failed")]
   OperationFailed(Operation),

   #[error("No device connected")]
   NoDeviceConnected,

   #[error("Invalid device id")]
   InvalidDeviceId,

   #[error("Adapter not found")]
   AdapterNotFound,

   #[error("Location request timed out after {0}s")]
   LocationTimeout(u64),

   #[error("Location unavailable: {0}")]
   LocationUnavailable(String),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

impl GateError {
   /// Creates a binding error from any displayable cause.
   pub fn binding(cause: impl std::fmt::Display) -> Self {
      Self::Binding(cause.to_string())
   }
}

/// Convenience type alias for Results with `GateError`.
pub type Result<T> = std::result::Result<T, GateError>;
