//! D-Bus surface of the permission gateway and Bluetooth session.
//!
//! Devices travel as JSON objects, payloads as hex strings.

use std::sync::Arc;

use log::info;
use serde_json::json;
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{
   bluetooth::{BluetoothSession, DeviceHandle, DiscoveryOutcome},
   error::GateError,
};

pub const SERVICE_NAME: &str = "org.bluegate";
pub const OBJECT_PATH: &str = "/org/bluegate/session";

pub struct SessionService {
   session: Arc<BluetoothSession>,
}

impl SessionService {
   pub const fn new(session: Arc<BluetoothSession>) -> Self {
      Self { session }
   }

   /// Resolves `id` against the currently connected devices.
   async fn connected_handle(&self, id: &str) -> Option<DeviceHandle> {
      self
         .session
         .get_connected()
         .await
         .into_iter()
         .find(|d| d.id.as_str() == id)
   }
}

fn failed(e: GateError) -> fdo::Error {
   fdo::Error::Failed(e.to_string())
}

fn devices_json(devices: &[DeviceHandle]) -> String {
   serde_json::Value::Array(devices.iter().map(DeviceHandle::to_json).collect()).to_string()
}

fn discovery_json(outcome: &DiscoveryOutcome) -> serde_json::Value {
   match outcome {
      DiscoveryOutcome::Devices(devices) => json!({
         "status": "devices",
         "devices": devices.iter().map(DeviceHandle::to_json).collect::<Vec<_>>(),
      }),
      DiscoveryOutcome::EnableAttempted(enabled) => json!({
         "status": "enable_attempted",
         "enabled": enabled,
      }),
      DiscoveryOutcome::PermissionsMissing => json!({
         "status": "permissions_missing",
         "granted": false,
      }),
      DiscoveryOutcome::Failed(e) => json!({
         "status": "failed",
         "error": e.to_string(),
      }),
   }
}

#[interface(name = "org.bluegate.Session")]
impl SessionService {
   // Permissions
   async fn request_permissions(&self) -> bool {
      self.session.permissions().request_all().await
   }

   async fn check_permissions(&self) -> bool {
      self.session.permissions().check_all().await
   }

   async fn request_location_service(&self) -> bool {
      self.session.permissions().request_location_service().await
   }

   // Adapter
   async fn is_enabled(&self) -> fdo::Result<bool> {
      self.session.is_enabled().await.map_err(failed)
   }

   async fn enable(&self) -> fdo::Result<bool> {
      self.session.enable().await.map_err(failed)
   }

   async fn open_settings(&self) -> fdo::Result<()> {
      self.session.open_settings().await.map_err(failed)
   }

   // Discovery
   async fn start_discovery(&self) -> String {
      let outcome = self.session.start_discovery().await;
      info!("Discovery over D-Bus: {outcome}");
      discovery_json(&outcome).to_string()
   }

   async fn stop_discovery(&self) {
      self.session.stop_discovery().await;
   }

   // Devices
   /// Returns the device as JSON, or `false` when the connection failed.
   async fn connect(&self, id: String) -> String {
      match self.session.connect(&id).await {
         Some(device) => device.to_json().to_string(),
         None => serde_json::Value::Bool(false).to_string(),
      }
   }

   async fn disconnect(&self, id: String) -> fdo::Result<bool> {
      self.session.disconnect(&id).await.map_err(failed)
   }

   async fn pair(&self, id: String) -> fdo::Result<String> {
      let device = self.session.pair(&id).await.map_err(failed)?;
      Ok(device.to_json().to_string())
   }

   async fn unpair(&self, id: String) -> fdo::Result<bool> {
      self.session.unpair(&id).await.map_err(failed)
   }

   async fn get_paired(&self) -> String {
      devices_json(&self.session.get_paired().await)
   }

   async fn get_bonded(&self) -> fdo::Result<String> {
      let devices = self.session.get_bonded().await.map_err(failed)?;
      Ok(devices_json(&devices))
   }

   async fn get_connected(&self) -> String {
      devices_json(&self.session.get_connected().await)
   }

   // Data
   /// Returns the next message hex-encoded, or an empty string when none is
   /// buffered.
   async fn read(&self, id: String) -> fdo::Result<String> {
      let device = self.connected_handle(&id).await;
      let data = self.session.read(device.as_ref()).await.map_err(failed)?;
      Ok(data.map(hex::encode).unwrap_or_default())
   }

   async fn write(&self, id: String, data: String) -> fdo::Result<bool> {
      let payload = hex::decode(data).map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
      let device = self.connected_handle(&id).await;
      self
         .session
         .write(device.as_ref(), payload)
         .await
         .map_err(failed)
   }

   async fn available(&self, id: String) -> fdo::Result<u32> {
      let device = self.connected_handle(&id).await;
      let count = self.session.available(device.as_ref()).await.map_err(failed)?;
      Ok(u32::try_from(count).unwrap_or(u32::MAX))
   }

   async fn clear(&self, id: String) -> fdo::Result<bool> {
      let device = self.connected_handle(&id).await;
      self.session.clear(device.as_ref()).await.map_err(failed)
   }

   // Signals
   #[zbus(signal)]
   pub async fn bluetooth_enabled(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn bluetooth_disabled(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn state_changed(emitter: &SignalEmitter<'_>, enabled: bool) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn device_connected(emitter: &SignalEmitter<'_>, device: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn device_disconnected(emitter: &SignalEmitter<'_>, device: &str)
   -> zbus::Result<()>;

   // Properties
   /// Read on demand; no change signal, so clients should not cache it.
   #[zbus(property(emits_changed_signal = "false"))]
   async fn connected_count(&self) -> u32 {
      u32::try_from(self.session.get_connected().await.len()).unwrap_or(u32::MAX)
   }
}
