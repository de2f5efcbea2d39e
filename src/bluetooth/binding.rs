//! Seam to the platform's classic Bluetooth stack.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;

use crate::{
   bluetooth::Subscription,
   error::Result,
   event::{EventKind, EventListener},
};

/// Caller-held reference to a peripheral returned by discovery, pairing or
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
   pub id: SmolStr,
   pub address: SmolStr,
   #[serde(default)]
   pub name: Option<SmolStr>,
   #[serde(default)]
   pub bonded: bool,
   #[serde(default)]
   pub device_class: Option<u32>,
}

impl DeviceHandle {
   pub fn new(address: impl Into<SmolStr>) -> Self {
      let address = address.into();
      Self {
         id: address.clone(),
         address,
         name: None,
         bonded: false,
         device_class: None,
      }
   }

   #[must_use]
   pub fn with_name(mut self, name: Option<impl Into<SmolStr>>) -> Self {
      self.name = name.map(Into::into);
      self
   }

   #[must_use]
   pub const fn with_bonded(mut self, bonded: bool) -> Self {
      self.bonded = bonded;
      self
   }

   #[must_use]
   pub const fn with_device_class(mut self, class: Option<u32>) -> Self {
      self.device_class = class;
      self
   }

   /// Name if known, otherwise the address.
   pub fn display_name(&self) -> &str {
      self.name.as_deref().unwrap_or(&self.address)
   }

   pub fn to_json(&self) -> serde_json::Value {
      json!({
         "id": self.id,
         "address": self.address,
         "name": self.name,
         "bonded": self.bonded,
         "device_class": self.device_class,
      })
   }
}

/// Platform classic-Bluetooth API.
///
/// Device ids are binding-defined strings; the BlueZ binding uses the
/// device's MAC address.
#[async_trait]
pub trait BluetoothBinding: Send + Sync {
   async fn is_enabled(&self) -> Result<bool>;

   /// Asks the platform to turn the adapter on. Returns whether it is on
   /// afterwards.
   async fn request_enable(&self) -> Result<bool>;

   /// Runs a discovery pass and returns the devices found.
   async fn start_discovery(&self) -> Result<Vec<DeviceHandle>>;

   async fn cancel_discovery(&self) -> Result<bool>;

   async fn connect(&self, id: &str) -> Result<DeviceHandle>;

   async fn disconnect(&self, id: &str) -> Result<bool>;

   async fn pair(&self, id: &str) -> Result<DeviceHandle>;

   async fn unpair(&self, id: &str) -> Result<bool>;

   async fn bonded_devices(&self) -> Result<Vec<DeviceHandle>>;

   async fn connected_devices(&self) -> Result<Vec<DeviceHandle>>;

   /// Registers `listener` for events of `kind`. Registration cannot fail.
   fn subscribe(&self, kind: EventKind, listener: EventListener) -> Subscription;

   async fn open_settings(&self) -> Result<()>;

   /// Reads the next buffered message, if any.
   async fn read(&self, device: &DeviceHandle) -> Result<Option<Vec<u8>>>;

   async fn write(&self, device: &DeviceHandle, data: &[u8]) -> Result<bool>;

   /// Number of buffered bytes waiting to be read.
   async fn available(&self, device: &DeviceHandle) -> Result<usize>;

   /// Drops everything buffered for the device.
   async fn clear(&self, device: &DeviceHandle) -> Result<bool>;
}
