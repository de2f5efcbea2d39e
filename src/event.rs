//! Bluetooth events delivered to subscribers.
//!
//! Bindings emit these to the listeners registered through
//! [`BluetoothBinding::subscribe`](crate::bluetooth::BluetoothBinding::subscribe).

use std::sync::Arc;

use crate::bluetooth::DeviceHandle;

/// Events that can be emitted by a Bluetooth binding.
#[derive(Debug, Clone, PartialEq)]
pub enum BluetoothEvent {
   Enabled,
   Disabled,
   StateChanged { enabled: bool },
   DeviceConnected(DeviceHandle),
   DeviceDisconnected(DeviceHandle),
}

/// Registration targets, one per event family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
   BluetoothEnabled,
   BluetoothDisabled,
   StateChanged,
   DeviceConnected,
   DeviceDisconnected,
}

impl BluetoothEvent {
   pub const fn kind(&self) -> EventKind {
      match self {
         Self::Enabled => EventKind::BluetoothEnabled,
         Self::Disabled => EventKind::BluetoothDisabled,
         Self::StateChanged { .. } => EventKind::StateChanged,
         Self::DeviceConnected(_) => EventKind::DeviceConnected,
         Self::DeviceDisconnected(_) => EventKind::DeviceDisconnected,
      }
   }

   /// Expands an adapter power change into the events it produces.
   pub fn from_power_change(enabled: bool) -> [Self; 2] {
      let edge = if enabled { Self::Enabled } else { Self::Disabled };
      [edge, Self::StateChanged { enabled }]
   }
}

/// Callback invoked for every event of the registered kind.
pub type EventListener = Arc<dyn Fn(BluetoothEvent) + Send + Sync>;
