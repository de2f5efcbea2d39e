//! Classic Bluetooth session layer.
//!
//! This module provides the binding seam, event subscriptions and the
//! session façade applications drive.

pub mod binding;
pub mod session;
pub mod subscription;

pub use binding::{BluetoothBinding, DeviceHandle};
pub use session::{BluetoothSession, DiscoveryOutcome};
pub use subscription::{Subscription, cleanup_subscriptions};
