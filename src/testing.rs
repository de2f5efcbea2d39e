//! In-memory bindings for unit tests.

use std::{
   collections::{HashMap, HashSet},
   sync::Arc,
   time::{Duration, SystemTime},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time;

use crate::{
   bluetooth::{BluetoothBinding, DeviceHandle, Subscription},
   error::{GateError, Result},
   event::{BluetoothEvent, EventKind, EventListener},
   notify::Notifier,
   permissions::{
      LocationOptions, LocationProvider, Permission, PermissionBackend, PermissionStatus, Position,
   },
};

// === Permissions ===

#[derive(Default)]
pub struct MockPermissions {
   statuses: Mutex<HashMap<Permission, PermissionStatus>>,
   omitted: Mutex<HashSet<Permission>>,
   failing: Mutex<bool>,
   requests: Mutex<usize>,
}

impl MockPermissions {
   pub fn granting(granted: &[Permission]) -> Self {
      let mock = Self::default();
      for permission in granted {
         mock.set_status(*permission, PermissionStatus::Granted);
      }
      mock
   }

   pub fn set_status(&self, permission: Permission, status: PermissionStatus) {
      self.statuses.lock().insert(permission, status);
   }

   pub fn revoke(&self, permission: Permission) {
      self.set_status(permission, PermissionStatus::Denied);
   }

   pub fn omit(&self, permission: Permission) {
      self.omitted.lock().insert(permission);
   }

   pub fn fail(&self) {
      *self.failing.lock() = true;
   }

   pub fn requests(&self) -> usize {
      *self.requests.lock()
   }

   fn status(&self, permission: Permission) -> PermissionStatus {
      self
         .statuses
         .lock()
         .get(&permission)
         .copied()
         .unwrap_or(PermissionStatus::Denied)
   }
}

#[async_trait]
impl PermissionBackend for MockPermissions {
   async fn request(
      &self,
      permissions: &[Permission],
   ) -> Result<Vec<(Permission, PermissionStatus)>> {
      *self.requests.lock() += 1;
      if *self.failing.lock() {
         return Err(GateError::binding("permission service unavailable"));
      }
      let omitted = self.omitted.lock().clone();
      Ok(permissions
         .iter()
         .filter(|p| !omitted.contains(*p))
         .map(|p| (*p, self.status(*p)))
         .collect())
   }

   async fn check(&self, permission: Permission) -> Result<bool> {
      if *self.failing.lock() {
         return Err(GateError::binding("permission service unavailable"));
      }
      Ok(self.status(permission).is_granted())
   }
}

// === Location ===

pub struct MockLocation {
   delay: Duration,
   failing: bool,
   last_options: Mutex<Option<LocationOptions>>,
}

impl MockLocation {
   pub fn fixed() -> Self {
      Self::delayed(Duration::ZERO)
   }

   pub fn delayed(delay: Duration) -> Self {
      Self {
         delay,
         failing: false,
         last_options: Mutex::new(None),
      }
   }

   pub fn failing() -> Self {
      Self {
         failing: true,
         ..Self::fixed()
      }
   }

   pub fn last_options(&self) -> Option<LocationOptions> {
      *self.last_options.lock()
   }
}

#[async_trait]
impl LocationProvider for MockLocation {
   async fn current_position(&self, options: &LocationOptions) -> Result<Position> {
      *self.last_options.lock() = Some(*options);
      if !self.delay.is_zero() {
         time::sleep(self.delay).await;
      }
      if self.failing {
         return Err(GateError::LocationUnavailable("provider disabled".into()));
      }
      Ok(Position {
         latitude: 52.52,
         longitude: 13.405,
         accuracy: 12.0,
         timestamp: SystemTime::now(),
      })
   }
}

// === Notifier ===

#[derive(Default)]
pub struct RecordingNotifier {
   messages: Mutex<Vec<String>>,
   failing: Mutex<bool>,
}

impl RecordingNotifier {
   pub fn messages(&self) -> Vec<String> {
      self.messages.lock().clone()
   }

   pub fn fail(&self) {
      *self.failing.lock() = true;
   }
}

#[async_trait]
impl Notifier for RecordingNotifier {
   async fn toast(&self, message: &str) -> Result<()> {
      if *self.failing.lock() {
         return Err(GateError::binding("notification daemon gone"));
      }
      self.messages.lock().push(message.to_owned());
      Ok(())
   }
}

// === Bluetooth ===

#[derive(Default)]
struct BindingState {
   disabled: bool,
   enable_refused: bool,
   discovered: Vec<DeviceHandle>,
   bonded: Vec<DeviceHandle>,
   connected: Vec<DeviceHandle>,
   failing: HashSet<&'static str>,
   calls: HashMap<&'static str, usize>,
   buffers: HashMap<String, Vec<u8>>,
}

/// Binding that records calls and loops written data back into the read
/// buffer.
#[derive(Default)]
pub struct MockBinding {
   state: Mutex<BindingState>,
   listeners: Arc<Mutex<Vec<(u64, EventKind, EventListener)>>>,
   next_listener: Mutex<u64>,
}

impl MockBinding {
   pub fn set_enabled(&self, enabled: bool) {
      self.state.lock().disabled = !enabled;
   }

   pub fn set_enable_result(&self, enabled: bool) {
      self.state.lock().enable_refused = !enabled;
   }

   pub fn set_discovered(&self, devices: Vec<DeviceHandle>) {
      self.state.lock().discovered = devices;
   }

   pub fn set_bonded(&self, devices: Vec<DeviceHandle>) {
      self.state.lock().bonded = devices;
   }

   pub fn set_connected(&self, devices: Vec<DeviceHandle>) {
      self.state.lock().connected = devices;
   }

   pub fn fail(&self, op: &'static str) {
      self.state.lock().failing.insert(op);
   }

   pub fn calls(&self, op: &str) -> usize {
      self.state.lock().calls.get(op).copied().unwrap_or(0)
   }

   pub fn total_calls(&self) -> usize {
      self.state.lock().calls.values().sum()
   }

   pub fn listener_count(&self) -> usize {
      self.listeners.lock().len()
   }

   pub fn emit(&self, event: BluetoothEvent) {
      let listeners: Vec<EventListener> = self
         .listeners
         .lock()
         .iter()
         .filter(|(_, kind, _)| *kind == event.kind())
         .map(|(_, _, l)| l.clone())
         .collect();
      for listener in listeners {
         listener(event.clone());
      }
   }

   fn enter(&self, op: &'static str) -> Result<()> {
      let mut state = self.state.lock();
      *state.calls.entry(op).or_default() += 1;
      if state.failing.contains(op) {
         return Err(GateError::binding(format!("{op} rejected by mock")));
      }
      Ok(())
   }
}

#[async_trait]
impl BluetoothBinding for MockBinding {
   async fn is_enabled(&self) -> Result<bool> {
      self.enter("is_enabled")?;
      Ok(!self.state.lock().disabled)
   }

   async fn request_enable(&self) -> Result<bool> {
      self.enter("request_enable")?;
      let mut state = self.state.lock();
      if !state.enable_refused {
         state.disabled = false;
      }
      Ok(!state.disabled)
   }

   async fn start_discovery(&self) -> Result<Vec<DeviceHandle>> {
      self.enter("start_discovery")?;
      Ok(self.state.lock().discovered.clone())
   }

   async fn cancel_discovery(&self) -> Result<bool> {
      self.enter("cancel_discovery")?;
      Ok(true)
   }

   async fn connect(&self, id: &str) -> Result<DeviceHandle> {
      self.enter("connect")?;
      Ok(DeviceHandle::new(id))
   }

   async fn disconnect(&self, _id: &str) -> Result<bool> {
      self.enter("disconnect")?;
      Ok(true)
   }

   async fn pair(&self, id: &str) -> Result<DeviceHandle> {
      self.enter("pair")?;
      Ok(DeviceHandle::new(id).with_bonded(true))
   }

   async fn unpair(&self, _id: &str) -> Result<bool> {
      self.enter("unpair")?;
      Ok(true)
   }

   async fn bonded_devices(&self) -> Result<Vec<DeviceHandle>> {
      self.enter("bonded_devices")?;
      Ok(self.state.lock().bonded.clone())
   }

   async fn connected_devices(&self) -> Result<Vec<DeviceHandle>> {
      self.enter("connected_devices")?;
      Ok(self.state.lock().connected.clone())
   }

   fn subscribe(&self, kind: EventKind, listener: EventListener) -> Subscription {
      let id = {
         let mut next = self.next_listener.lock();
         *next += 1;
         *next
      };
      self.listeners.lock().push((id, kind, listener));
      let listeners = self.listeners.clone();
      Subscription::new(kind, move || {
         listeners.lock().retain(|(lid, _, _)| *lid != id);
         Ok(())
      })
   }

   async fn open_settings(&self) -> Result<()> {
      self.enter("open_settings")
   }

   async fn read(&self, device: &DeviceHandle) -> Result<Option<Vec<u8>>> {
      self.enter("read")?;
      let mut state = self.state.lock();
      let buffer = state.buffers.entry(device.id.to_string()).or_default();
      Ok(buffer
         .iter()
         .position(|b| *b == b'\n')
         .map(|end| buffer.drain(..=end).collect()))
   }

   async fn write(&self, device: &DeviceHandle, data: &[u8]) -> Result<bool> {
      self.enter("write")?;
      self
         .state
         .lock()
         .buffers
         .entry(device.id.to_string())
         .or_default()
         .extend_from_slice(data);
      Ok(true)
   }

   async fn available(&self, device: &DeviceHandle) -> Result<usize> {
      self.enter("available")?;
      Ok(self
         .state
         .lock()
         .buffers
         .get(device.id.as_str())
         .map_or(0, Vec::len))
   }

   async fn clear(&self, device: &DeviceHandle) -> Result<bool> {
      self.enter("clear")?;
      self.state.lock().buffers.remove(device.id.as_str());
      Ok(true)
   }
}
