//! Runtime permission gateway and classic-Bluetooth session façade.
//!
//! [`permissions::PermissionGateway`] requests and checks a fixed set of
//! permissions and asks for a location fix. [`bluetooth::BluetoothSession`]
//! delegates enable, discovery, pairing, connection, data and event
//! operations to a [`bluetooth::BluetoothBinding`], gating discovery on the
//! gateway. The [`bluez`] module binds both to BlueZ, GeoClue2 and desktop
//! notifications on Linux.

pub mod bluetooth;
pub mod bluez;
pub mod config;
pub mod dbus;
pub mod error;
pub mod event;
pub mod notify;
pub mod permissions;

#[cfg(test)]
mod testing;
