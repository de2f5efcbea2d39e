//! Bluetooth session façade.
//!
//! Every operation is a single delegation to the [`BluetoothBinding`]. Each
//! operation keeps its own failure policy: some log and return a sentinel
//! (`false`, `None`, an empty list, or the error as a value), others log
//! and return a normalized [`GateError::OperationFailed`]. Callers rely on
//! the per-operation behavior, so the policies are not unified.

use std::{fmt, sync::Arc};

use log::{debug, error, info, warn};

use crate::{
   bluetooth::{BluetoothBinding, DeviceHandle, Subscription, subscription},
   error::{GateError, Operation, Result},
   event::{BluetoothEvent, EventKind, EventListener},
   notify::Notifier,
   permissions::PermissionGateway,
};

/// Result of [`BluetoothSession::start_discovery`].
#[derive(Debug)]
pub enum DiscoveryOutcome {
   /// Discovery ran and found these devices.
   Devices(Vec<DeviceHandle>),
   /// Bluetooth was off; enabling was attempted instead of discovering.
   EnableAttempted(bool),
   /// Required permissions are missing; discovery was not attempted.
   PermissionsMissing,
   /// Enabling or discovery failed.
   Failed(GateError),
}

impl DiscoveryOutcome {
   pub fn devices(&self) -> Option<&[DeviceHandle]> {
      match self {
         Self::Devices(devices) => Some(devices),
         _ => None,
      }
   }
}

impl fmt::Display for DiscoveryOutcome {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Devices(devices) => write!(f, "found {} devices", devices.len()),
         Self::EnableAttempted(enabled) => write!(f, "enable attempted (enabled: {enabled})"),
         Self::PermissionsMissing => f.write_str("permissions missing"),
         Self::Failed(e) => write!(f, "failed: {e}"),
      }
   }
}

pub struct BluetoothSession {
   binding: Arc<dyn BluetoothBinding>,
   permissions: Arc<PermissionGateway>,
   notifier: Arc<dyn Notifier>,
}

impl BluetoothSession {
   pub fn new(
      binding: Arc<dyn BluetoothBinding>,
      permissions: Arc<PermissionGateway>,
      notifier: Arc<dyn Notifier>,
   ) -> Self {
      Self {
         binding,
         permissions,
         notifier,
      }
   }

   pub fn permissions(&self) -> &PermissionGateway {
      &self.permissions
   }

   async fn toast(&self, message: &str) {
      if let Err(e) = self.notifier.toast(message).await {
         warn!("Failed to show notice {message:?}: {e}");
      }
   }

   // === Adapter ===

   pub async fn is_enabled(&self) -> Result<bool> {
      self
         .binding
         .is_enabled()
         .await
         .map_err(|e| normalize(Operation::IsEnabled, e))
   }

   pub async fn enable(&self) -> Result<bool> {
      self
         .binding
         .request_enable()
         .await
         .map_err(|e| normalize(Operation::Enable, e))
   }

   pub async fn open_settings(&self) -> Result<()> {
      match self.binding.open_settings().await {
         Ok(()) => {
            self.toast("Opened Bluetooth settings").await;
            Ok(())
         },
         Err(e) => {
            self.toast("Could not open Bluetooth settings").await;
            Err(normalize(Operation::OpenSettings, e))
         },
      }
   }

   // === Discovery ===

   /// Discovers nearby devices once Bluetooth is on and permissions are
   /// granted. Discovery is cancelled afterwards on every path.
   pub async fn start_discovery(&self) -> DiscoveryOutcome {
      let outcome = self.discover().await;
      self.stop_discovery().await;
      debug!("Discovery finished: {outcome}");
      outcome
   }

   async fn discover(&self) -> DiscoveryOutcome {
      let enabled = match self.binding.is_enabled().await {
         Ok(enabled) => enabled,
         Err(e) => {
            error!("Bluetooth {} failed: {e}", Operation::IsEnabled);
            return DiscoveryOutcome::Failed(e);
         },
      };

      if !enabled {
         info!("Bluetooth is off, requesting enable instead of discovering");
         return match self.binding.request_enable().await {
            Ok(enabled) => DiscoveryOutcome::EnableAttempted(enabled),
            Err(e) => {
               error!("Failed to enable Bluetooth: {e}");
               DiscoveryOutcome::Failed(e)
            },
         };
      }

      if !self.permissions.check_all().await {
         warn!("Discovery skipped: permissions missing");
         return DiscoveryOutcome::PermissionsMissing;
      }

      match self.binding.start_discovery().await {
         Ok(devices) => {
            info!("Discovered {} devices", devices.len());
            DiscoveryOutcome::Devices(devices)
         },
         Err(e) => {
            error!("Bluetooth {} failed: {e}", Operation::StartDiscovery);
            DiscoveryOutcome::Failed(e)
         },
      }
   }

   pub async fn stop_discovery(&self) {
      match self.binding.cancel_discovery().await {
         Ok(_) => debug!("Discovery cancelled"),
         Err(e) => {
            error!("Bluetooth {} failed: {e}", Operation::StopDiscovery);
            self.toast("Could not stop Bluetooth discovery").await;
         },
      }
   }

   // === Devices ===

   /// Connects to `id`. Resolves to `None` on any failure.
   pub async fn connect(&self, id: &str) -> Option<DeviceHandle> {
      if id.is_empty() {
         warn!("Connect called without a device id");
         self.toast("Connection failed: no device selected").await;
         return None;
      }

      match self.binding.connect(id).await {
         Ok(device) => {
            info!("Connected to {} ({})", device.display_name(), device.address);
            Some(device)
         },
         Err(e) => {
            error!("Bluetooth {} to {id} failed: {e}", Operation::Connect);
            self.toast(&format!("Connection to {id} failed")).await;
            None
         },
      }
   }

   pub async fn disconnect(&self, id: &str) -> Result<bool> {
      require_id(id)?;
      self
         .binding
         .disconnect(id)
         .await
         .map_err(|e| normalize(Operation::Disconnect, e))
   }

   pub async fn pair(&self, id: &str) -> Result<DeviceHandle> {
      require_id(id)?;
      self
         .binding
         .pair(id)
         .await
         .map_err(|e| normalize(Operation::Pair, e))
   }

   pub async fn unpair(&self, id: &str) -> Result<bool> {
      require_id(id)?;
      self
         .binding
         .unpair(id)
         .await
         .map_err(|e| normalize(Operation::Unpair, e))
   }

   /// Bonded devices, or an empty list if the binding fails.
   pub async fn get_paired(&self) -> Vec<DeviceHandle> {
      self.binding.bonded_devices().await.unwrap_or_else(|e| {
         error!("Bluetooth {} failed: {e}", Operation::GetPaired);
         Vec::new()
      })
   }

   // Same binding call as `get_paired`, but failures propagate.
   pub async fn get_bonded(&self) -> Result<Vec<DeviceHandle>> {
      self
         .binding
         .bonded_devices()
         .await
         .map_err(|e| normalize(Operation::GetBonded, e))
   }

   pub async fn get_connected(&self) -> Vec<DeviceHandle> {
      self.binding.connected_devices().await.unwrap_or_else(|e| {
         error!("Bluetooth {} failed: {e}", Operation::GetConnected);
         Vec::new()
      })
   }

   // === Events ===

   pub fn on_bluetooth_enabled<F>(&self, callback: F) -> Subscription
   where
      F: Fn() + Send + Sync + 'static,
   {
      self.subscribe(EventKind::BluetoothEnabled, move |event| {
         if matches!(event, BluetoothEvent::Enabled) {
            callback();
         }
      })
   }

   pub fn on_bluetooth_disabled<F>(&self, callback: F) -> Subscription
   where
      F: Fn() + Send + Sync + 'static,
   {
      self.subscribe(EventKind::BluetoothDisabled, move |event| {
         if matches!(event, BluetoothEvent::Disabled) {
            callback();
         }
      })
   }

   pub fn on_state_changed<F>(&self, callback: F) -> Subscription
   where
      F: Fn(bool) + Send + Sync + 'static,
   {
      self.subscribe(EventKind::StateChanged, move |event| {
         if let BluetoothEvent::StateChanged { enabled } = event {
            callback(enabled);
         }
      })
   }

   pub fn on_device_connected<F>(&self, callback: F) -> Subscription
   where
      F: Fn(DeviceHandle) + Send + Sync + 'static,
   {
      self.subscribe(EventKind::DeviceConnected, move |event| {
         if let BluetoothEvent::DeviceConnected(device) = event {
            callback(device);
         }
      })
   }

   pub fn on_device_disconnected<F>(&self, callback: F) -> Subscription
   where
      F: Fn(DeviceHandle) + Send + Sync + 'static,
   {
      self.subscribe(EventKind::DeviceDisconnected, move |event| {
         if let BluetoothEvent::DeviceDisconnected(device) = event {
            callback(device);
         }
      })
   }

   fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
   where
      F: Fn(BluetoothEvent) + Send + Sync + 'static,
   {
      let listener: EventListener = Arc::new(listener);
      self.binding.subscribe(kind, listener)
   }

   /// Releases every subscription in order, continuing past failures.
   pub fn cleanup_subscriptions(&self, subscriptions: impl IntoIterator<Item = Subscription>) {
      subscription::cleanup_subscriptions(subscriptions);
   }

   // === Data ===

   pub async fn read(&self, device: Option<&DeviceHandle>) -> Result<Option<Vec<u8>>> {
      let device = device.ok_or(GateError::NoDeviceConnected)?;
      self
         .binding
         .read(device)
         .await
         .map_err(|e| normalize(Operation::Read, e))
   }

   pub async fn write(&self, device: Option<&DeviceHandle>, data: impl AsRef<[u8]>) -> Result<bool> {
      let device = device.ok_or(GateError::NoDeviceConnected)?;
      self
         .binding
         .write(device, data.as_ref())
         .await
         .map_err(|e| normalize(Operation::Write, e))
   }

   pub async fn available(&self, device: Option<&DeviceHandle>) -> Result<usize> {
      let device = device.ok_or(GateError::NoDeviceConnected)?;
      self
         .binding
         .available(device)
         .await
         .map_err(|e| normalize(Operation::Available, e))
   }

   pub async fn clear(&self, device: Option<&DeviceHandle>) -> Result<bool> {
      let device = device.ok_or(GateError::NoDeviceConnected)?;
      self
         .binding
         .clear(device)
         .await
         .map_err(|e| normalize(Operation::Clear, e))
   }
}

fn require_id(id: &str) -> Result<()> {
   if id.is_empty() {
      return Err(GateError::InvalidDeviceId);
   }
   Ok(())
}

fn normalize(operation: Operation, cause: GateError) -> GateError {
   error!("Bluetooth {operation} failed: {cause}");
   GateError::OperationFailed(operation)
}
