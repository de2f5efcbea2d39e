//! Classic Bluetooth binding on top of BlueZ.
//!
//! Device ids are MAC addresses. Connections are RFCOMM links on the
//! configured channel; only devices with an open link count as connected
//! for `connected_devices` and the data operations.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use bluer::{
   Adapter, AdapterEvent, AdapterProperty, Address, DeviceEvent, DeviceProperty, DiscoveryFilter,
   DiscoveryTransport, Session,
};
use futures::stream::{SelectAll, Stream, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::{
   process::Command,
   runtime::Handle,
   select,
   sync::{Mutex as AsyncMutex, Notify},
   time,
};

use crate::{
   bluetooth::{BluetoothBinding, DeviceHandle, Subscription},
   bluez::rfcomm::{LinkOptions, RfcommLink},
   config::Config,
   error::{GateError, Result},
   event::{BluetoothEvent, EventKind, EventListener},
};

type DeviceEvents = Pin<Box<dyn Stream<Item = (Address, DeviceEvent)> + Send>>;

/// BlueZ-backed [`BluetoothBinding`].
pub struct BluerBinding {
   session: Session,
   runtime: Handle,
   adapter_name: Option<String>,
   rfcomm_channel: u8,
   link_options: LinkOptions,
   discovery_window: Duration,
   settings_command: Vec<String>,
   discovery_cancel: Notify,
   links: Links,
}

impl BluerBinding {
   pub async fn new(config: &Config) -> Result<Self> {
      let session = Session::new().await?;
      Ok(Self {
         session,
         runtime: Handle::current(),
         adapter_name: config.bluetooth.adapter.clone(),
         rfcomm_channel: config.bluetooth.rfcomm_channel,
         link_options: LinkOptions {
            delimiter: config.bluetooth.read_delimiter,
            max_buffer: config.bluetooth.max_buffer,
         },
         discovery_window: config.bluetooth.discovery_window(),
         settings_command: config.settings_command.clone(),
         discovery_cancel: Notify::new(),
         links: Links::default(),
      })
   }

   pub const fn session(&self) -> &Session {
      &self.session
   }

   async fn adapter(&self) -> Result<Adapter> {
      match &self.adapter_name {
         Some(name) => Ok(self.session.adapter(name)?),
         None => self
            .session
            .default_adapter()
            .await
            .map_err(|_| GateError::AdapterNotFound),
      }
   }

   fn link(&self, device: &DeviceHandle) -> Result<Arc<RfcommLink>> {
      let address = parse_address(&device.address)?;
      self.links.get(address).ok_or(GateError::NoDeviceConnected)
   }
}

/// Open RFCOMM links by device address.
#[derive(Default)]
struct Links {
   open: Mutex<HashMap<Address, Arc<RfcommLink>>>,
   connecting: AsyncMutex<()>,
}

impl Links {
   fn get(&self, address: Address) -> Option<Arc<RfcommLink>> {
      self.open.lock().get(&address).filter(|link| link.is_open()).cloned()
   }

   fn remove(&self, address: Address) -> Option<Arc<RfcommLink>> {
      self.open.lock().remove(&address)
   }

   fn addresses(&self) -> Vec<Address> {
      self
         .open
         .lock()
         .iter()
         .filter(|(_, link)| link.is_open())
         .map(|(addr, _)| *addr)
         .collect()
   }

   /// Runs `open` unless a link to `address` is already open, and registers
   /// the new link only once `describe` succeeded. Connects are serialized so
   /// one address never gets two links.
   async fn connect<O, D>(&self, address: Address, open: O, describe: D) -> Result<DeviceHandle>
   where
      O: Future<Output = Result<RfcommLink>>,
      D: Future<Output = Result<DeviceHandle>>,
   {
      let _connecting = self.connecting.lock().await;
      if self.get(address).is_some() {
         return describe.await;
      }

      let link = open.await?;
      let handle = describe.await?;
      self.open.lock().insert(address, Arc::new(link));
      info!("Connected to {address}");
      Ok(handle)
   }
}

fn parse_address(id: &str) -> Result<Address> {
   id.parse().map_err(|_| GateError::InvalidDeviceId)
}

/// Builds a handle from the device's current BlueZ properties.
async fn describe(adapter: &Adapter, address: Address) -> Result<DeviceHandle> {
   let device = adapter.device(address)?;
   let name = device.name().await.ok().flatten();
   let bonded = device.is_paired().await.unwrap_or(false);
   let class = device.class().await.ok().flatten();
   Ok(DeviceHandle::new(address.to_string())
      .with_name(name)
      .with_bonded(bonded)
      .with_device_class(class))
}

async fn describe_all(adapter: &Adapter, addresses: &[Address]) -> Vec<DeviceHandle> {
   let mut handles = Vec::with_capacity(addresses.len());
   for address in addresses {
      match describe(adapter, *address).await {
         Ok(handle) => handles.push(handle),
         Err(e) => debug!("Skipping {address}: {e}"),
      }
   }
   handles
}

#[async_trait]
impl BluetoothBinding for BluerBinding {
   async fn is_enabled(&self) -> Result<bool> {
      Ok(self.adapter().await?.is_powered().await?)
   }

   async fn request_enable(&self) -> Result<bool> {
      let adapter = self.adapter().await?;
      if !adapter.is_powered().await? {
         adapter.set_powered(true).await?;
         info!("Powered on adapter: {}", adapter.name());
      }
      Ok(adapter.is_powered().await?)
   }

   async fn start_discovery(&self) -> Result<Vec<DeviceHandle>> {
      let adapter = self.adapter().await?;
      adapter
         .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::BrEdr,
            ..Default::default()
         })
         .await?;

      // BlueZ keeps discovering while the event stream is alive.
      let events = adapter.discover_devices().await?;
      let found = discovery_window(events, self.discovery_window, &self.discovery_cancel).await;
      Ok(describe_all(&adapter, &found).await)
   }

   /// Ends every discovery window in progress on this binding. Fails when
   /// the adapter is gone.
   async fn cancel_discovery(&self) -> Result<bool> {
      self.discovery_cancel.notify_waiters();
      let adapter = self.adapter().await?;
      Ok(!adapter.is_discovering().await?)
   }

   async fn connect(&self, id: &str) -> Result<DeviceHandle> {
      let address = parse_address(id)?;
      let adapter = self.adapter().await?;
      self
         .links
         .connect(
            address,
            RfcommLink::open(address, self.rfcomm_channel, self.link_options),
            describe(&adapter, address),
         )
         .await
   }

   async fn disconnect(&self, id: &str) -> Result<bool> {
      let address = parse_address(id)?;
      let link = self.links.remove(address);
      if link.is_none() {
         let device = self.adapter().await?.device(address)?;
         if !device.is_connected().await? {
            return Err(GateError::NoDeviceConnected);
         }
         device.disconnect().await?;
      }
      info!("Disconnected from {address}");
      Ok(true)
   }

   async fn pair(&self, id: &str) -> Result<DeviceHandle> {
      let address = parse_address(id)?;
      let adapter = self.adapter().await?;
      let device = adapter.device(address)?;
      if !device.is_paired().await? {
         device.pair().await?;
         info!("Paired with {address}");
      }
      describe(&adapter, address).await
   }

   async fn unpair(&self, id: &str) -> Result<bool> {
      let address = parse_address(id)?;
      self.links.remove(address);
      self.adapter().await?.remove_device(address).await?;
      info!("Removed pairing with {address}");
      Ok(true)
   }

   async fn bonded_devices(&self) -> Result<Vec<DeviceHandle>> {
      let adapter = self.adapter().await?;
      let mut bonded = Vec::new();
      for address in adapter.device_addresses().await? {
         if adapter.device(address)?.is_paired().await? {
            bonded.push(address);
         }
      }
      Ok(describe_all(&adapter, &bonded).await)
   }

   async fn connected_devices(&self) -> Result<Vec<DeviceHandle>> {
      let open = self.links.addresses();
      if open.is_empty() {
         return Ok(Vec::new());
      }
      let adapter = self.adapter().await?;
      Ok(describe_all(&adapter, &open).await)
   }

   fn subscribe(&self, kind: EventKind, listener: EventListener) -> Subscription {
      let session = self.session.clone();
      let adapter_name = self.adapter_name.clone();
      spawn_watcher(&self.runtime, kind, async move {
         let adapter = match &adapter_name {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
         };
         let result = match adapter {
            Ok(adapter) => watch(adapter, kind, listener).await,
            Err(e) => Err(e.into()),
         };
         if let Err(e) = result {
            warn!("Event watcher for {kind} stopped: {e}");
         }
      })
   }

   async fn open_settings(&self) -> Result<()> {
      let (program, args) = self
         .settings_command
         .split_first()
         .ok_or_else(|| GateError::binding("no settings command configured"))?;
      Command::new(program).args(args).spawn()?;
      Ok(())
   }

   async fn read(&self, device: &DeviceHandle) -> Result<Option<Vec<u8>>> {
      Ok(self.link(device)?.read())
   }

   async fn write(&self, device: &DeviceHandle, data: &[u8]) -> Result<bool> {
      self.link(device)?.write(data).await?;
      Ok(true)
   }

   async fn available(&self, device: &DeviceHandle) -> Result<usize> {
      Ok(self.link(device)?.available())
   }

   async fn clear(&self, device: &DeviceHandle) -> Result<bool> {
      self.link(device)?.clear();
      Ok(true)
   }
}

/// Collects devices announced by `events` until `window` elapses, the
/// stream ends or `cancel` is notified.
async fn discovery_window<S>(events: S, window: Duration, cancel: &Notify) -> Vec<Address>
where
   S: Stream<Item = AdapterEvent>,
{
   let mut events = std::pin::pin!(events);
   let deadline = time::sleep(window);
   let mut deadline = std::pin::pin!(deadline);
   let cancelled = cancel.notified();
   let mut cancelled = std::pin::pin!(cancelled);

   let mut found: Vec<Address> = Vec::new();
   loop {
      select! {
         _ = &mut deadline => break,
         _ = &mut cancelled => {
            debug!("Discovery cancelled early");
            break;
         }
         event = events.next() => match event {
            Some(AdapterEvent::DeviceAdded(addr)) => {
               if !found.contains(&addr) {
                  debug!("Discovered {addr}");
                  found.push(addr);
               }
            },
            Some(_) => {},
            None => break,
         },
      }
   }
   found
}

// === Event watchers ===

/// Runs `watcher` on `runtime`; releasing the subscription aborts it. Works
/// from threads outside the runtime.
fn spawn_watcher<F>(runtime: &Handle, kind: EventKind, watcher: F) -> Subscription
where
   F: Future<Output = ()> + Send + 'static,
{
   let handle = runtime.spawn(watcher);
   Subscription::new(kind, move || {
      handle.abort();
      Ok(())
   })
}

async fn watch(adapter: Adapter, kind: EventKind, listener: EventListener) -> Result<()> {
   match kind {
      EventKind::BluetoothEnabled | EventKind::BluetoothDisabled | EventKind::StateChanged => {
         watch_power(adapter, kind, listener).await
      },
      EventKind::DeviceConnected | EventKind::DeviceDisconnected => {
         watch_connections(adapter, kind, listener).await
      },
   }
}

async fn watch_power(adapter: Adapter, kind: EventKind, listener: EventListener) -> Result<()> {
   let events = adapter.events().await?;
   let mut events = std::pin::pin!(events);
   while let Some(event) = events.next().await {
      if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(enabled)) = event {
         for event in BluetoothEvent::from_power_change(enabled) {
            if event.kind() == kind {
               listener(event);
            }
         }
      }
   }
   Ok(())
}

async fn device_events(adapter: &Adapter, address: Address) -> Result<DeviceEvents> {
   let events = adapter.device(address)?.events().await?;
   Ok(Box::pin(events.map(move |event| (address, event))))
}

async fn watch_connections(
   adapter: Adapter,
   kind: EventKind,
   listener: EventListener,
) -> Result<()> {
   let mut devices: SelectAll<DeviceEvents> = SelectAll::new();
   for address in adapter.device_addresses().await? {
      devices.push(device_events(&adapter, address).await?);
   }
   let adapter_events = adapter.events().await?;
   let mut adapter_events = std::pin::pin!(adapter_events);

   loop {
      select! {
         Some(event) = adapter_events.next() => {
            if let AdapterEvent::DeviceAdded(address) = event {
               match device_events(&adapter, address).await {
                  Ok(stream) => devices.push(stream),
                  Err(e) => debug!("Cannot watch {address}: {e}"),
               }
            }
         }
         Some((address, event)) = devices.next() => {
            let DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) = event else {
               continue;
            };
            let handle = describe(&adapter, address)
               .await
               .unwrap_or_else(|_| DeviceHandle::new(address.to_string()));
            let event = if connected {
               BluetoothEvent::DeviceConnected(handle)
            } else {
               BluetoothEvent::DeviceDisconnected(handle)
            };
            if event.kind() == kind {
               listener(event);
            }
         }
         else => break,
      }
   }

   Ok(())
}

#[cfg(test)]
mod tests {
   use std::sync::atomic::{AtomicUsize, Ordering};

   use futures::stream;
   use tokio::{
      io::{DuplexStream, duplex, split},
      sync::oneshot,
   };

   use super::*;

   const ADDRESS: &str = "00:11:22:33:44:55";

   fn address() -> Address {
      ADDRESS.parse().unwrap()
   }

   fn loopback() -> (RfcommLink, DuplexStream) {
      let (ours, theirs) = duplex(256);
      let (r, w) = split(ours);
      let options = LinkOptions {
         delimiter: b'\n',
         max_buffer: 1024,
      };
      (RfcommLink::from_halves(r, w, options), theirs)
   }

   async fn opening(opened: &AtomicUsize, link: RfcommLink) -> Result<RfcommLink> {
      opened.fetch_add(1, Ordering::SeqCst);
      tokio::task::yield_now().await;
      Ok(link)
   }

   async fn described(address: Address) -> Result<DeviceHandle> {
      Ok(DeviceHandle::new(address.to_string()))
   }

   async fn undescribed() -> Result<DeviceHandle> {
      Err(GateError::binding("device properties unavailable"))
   }

   #[tokio::test]
   async fn test_connect_registers_link_after_describe() {
      let links = Links::default();
      let opened = AtomicUsize::new(0);
      let (link, _peer) = loopback();

      let handle = links
         .connect(address(), opening(&opened, link), described(address()))
         .await
         .unwrap();
      assert_eq!(handle.id, ADDRESS);
      assert!(links.get(address()).is_some());
      assert_eq!(links.addresses(), vec![address()]);

      let (spare, _spare_peer) = loopback();
      links
         .connect(address(), opening(&opened, spare), described(address()))
         .await
         .unwrap();
      assert_eq!(opened.load(Ordering::SeqCst), 1);
   }

   #[tokio::test]
   async fn test_failed_describe_leaves_no_link() {
      let links = Links::default();
      let opened = AtomicUsize::new(0);
      let (link, _peer) = loopback();

      let result = links
         .connect(address(), opening(&opened, link), undescribed())
         .await;
      assert!(matches!(result, Err(GateError::Binding(_))));
      assert_eq!(opened.load(Ordering::SeqCst), 1);
      assert!(links.get(address()).is_none());
      assert!(links.addresses().is_empty());
   }

   #[tokio::test]
   async fn test_concurrent_connects_open_one_link() {
      let links = Links::default();
      let opened = AtomicUsize::new(0);
      let (first, _first_peer) = loopback();
      let (second, _second_peer) = loopback();

      let (a, b) = tokio::join!(
         links.connect(address(), opening(&opened, first), described(address())),
         links.connect(address(), opening(&opened, second), described(address())),
      );
      assert!(a.is_ok() && b.is_ok());
      assert_eq!(opened.load(Ordering::SeqCst), 1);
      assert_eq!(links.addresses().len(), 1);
   }

   #[tokio::test(start_paused = true)]
   async fn test_discovery_window_collects_until_deadline() {
      let other: Address = "00:11:22:33:44:66".parse().unwrap();
      let events = stream::iter([
         AdapterEvent::DeviceAdded(address()),
         AdapterEvent::DeviceAdded(other),
         AdapterEvent::DeviceAdded(address()),
      ])
      .chain(stream::pending());

      let cancel = Notify::new();
      let found = discovery_window(events, Duration::from_secs(12), &cancel).await;
      assert_eq!(found, vec![address(), other]);
   }

   #[tokio::test(start_paused = true)]
   async fn test_cancel_ends_every_open_window() {
      let cancel = Notify::new();
      let window = Duration::from_secs(3600);
      let first = discovery_window(stream::pending::<AdapterEvent>(), window, &cancel);
      let second = discovery_window(stream::pending::<AdapterEvent>(), window, &cancel);
      let trigger = async {
         tokio::task::yield_now().await;
         cancel.notify_waiters();
      };

      let started = time::Instant::now();
      let (a, b, ()) = tokio::join!(first, second, trigger);
      assert!(a.is_empty() && b.is_empty());
      assert!(started.elapsed() < window);
   }

   #[test]
   fn test_watcher_registration_outside_runtime() {
      let runtime = tokio::runtime::Builder::new_multi_thread()
         .worker_threads(1)
         .enable_all()
         .build()
         .unwrap();
      let (alive, stopped) = oneshot::channel::<()>();

      let subscription = spawn_watcher(runtime.handle(), EventKind::StateChanged, async move {
         let _alive = alive;
         std::future::pending::<()>().await;
      });
      assert_eq!(subscription.kind(), EventKind::StateChanged);

      subscription.release().unwrap();
      assert!(stopped.blocking_recv().is_err());
   }
}
