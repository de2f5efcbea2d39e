//! bluegate D-Bus service
//!
//! Exposes the permission gateway and the classic-Bluetooth session on the
//! session bus and re-emits adapter and device events as D-Bus signals.

use std::{sync::Arc, time::Duration};

use bluegate::{
   bluetooth::{BluetoothSession, Subscription},
   bluez::{BluerBinding, DesktopNotifier, GeoClueLocation, SystemPermissions},
   config::Config,
   dbus::{OBJECT_PATH, SERVICE_NAME, SessionService, SessionServiceSignals},
   error::Result,
   event::BluetoothEvent,
   notify::{LogNotifier, Notifier},
   permissions::PermissionGateway,
};
use crossbeam::queue::SegQueue;
use log::{info, warn};
use tokio::{signal, sync::Notify, time};
use zbus::{Connection, connection, object_server::InterfaceRef};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting bluegate D-Bus service...");

   let config = Config::load()?;
   info!(
      "Loaded configuration with {} required permissions",
      config.permissions.len()
   );

   let system_bus = Connection::system().await?;
   let binding = Arc::new(BluerBinding::new(&config).await?);

   let gateway = Arc::new(
      PermissionGateway::new(
         config.permissions.clone(),
         Arc::new(SystemPermissions::new(
            binding.session().clone(),
            system_bus.clone(),
         )),
         Arc::new(GeoClueLocation::new(
            system_bus,
            config.notifications.app_name.clone(),
         )),
      )
      .with_location_options(config.location.options()),
   );

   let notifier: Arc<dyn Notifier> = if config.notifications.desktop {
      match DesktopNotifier::connect(&config.notifications).await {
         Ok(notifier) => Arc::new(notifier),
         Err(e) => {
            warn!("Desktop notifications unavailable, logging notices instead: {e}");
            Arc::new(LogNotifier)
         },
      }
   } else {
      Arc::new(LogNotifier)
   };

   let session = Arc::new(BluetoothSession::new(binding, gateway, notifier));

   if !session.permissions().check_all().await {
      warn!("Not all required permissions are available; discovery will be refused");
   }

   let event_bus = EventProcessor::new();
   let subscriptions = event_bus.subscribe_all(&session);

   let connection = connection::Builder::session()?
      .name(SERVICE_NAME)?
      .serve_at(OBJECT_PATH, SessionService::new(session.clone()))?
      .build()
      .await?;

   info!("bluegate D-Bus service started at {SERVICE_NAME}");

   event_bus.spawn_dispatcher(connection).await?;

   signal::ctrl_c().await?;
   info!("Shutting down bluegate service...");

   session.cleanup_subscriptions(subscriptions);

   Ok(())
}

struct EventProcessor {
   queue: SegQueue<BluetoothEvent>,
   notifier: Notify,
}

impl EventProcessor {
   fn new() -> Arc<Self> {
      Arc::new(Self {
         queue: SegQueue::new(),
         notifier: Notify::new(),
      })
   }

   fn emit(&self, event: BluetoothEvent) {
      self.queue.push(event);
      self.notifier.notify_waiters();
   }

   fn subscribe_all(self: &Arc<Self>, session: &BluetoothSession) -> Vec<Subscription> {
      let bus = self.clone();
      let enabled = session.on_bluetooth_enabled(move || bus.emit(BluetoothEvent::Enabled));
      let bus = self.clone();
      let disabled = session.on_bluetooth_disabled(move || bus.emit(BluetoothEvent::Disabled));
      let bus = self.clone();
      let state =
         session.on_state_changed(move |enabled| bus.emit(BluetoothEvent::StateChanged { enabled }));
      let bus = self.clone();
      let connected = session.on_device_connected(move |device| {
         bus.emit(BluetoothEvent::DeviceConnected(device));
      });
      let bus = self.clone();
      let disconnected = session.on_device_disconnected(move |device| {
         bus.emit(BluetoothEvent::DeviceDisconnected(device));
      });
      vec![enabled, disabled, state, connected, disconnected]
   }

   async fn recv(self: &Arc<Self>) -> Option<BluetoothEvent> {
      loop {
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         let notify = self.notifier.notified();
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         if Arc::strong_count(self) == 1 {
            return None;
         }
         let _ = time::timeout(Duration::from_secs(1), notify).await;
      }
   }

   async fn dispatch(&self, iface: &InterfaceRef<SessionService>, event: BluetoothEvent) -> Result<()> {
      match event {
         BluetoothEvent::Enabled => iface.bluetooth_enabled().await?,
         BluetoothEvent::Disabled => iface.bluetooth_disabled().await?,
         BluetoothEvent::StateChanged { enabled } => iface.state_changed(enabled).await?,
         BluetoothEvent::DeviceConnected(device) => {
            iface.device_connected(&device.to_json().to_string()).await?;
         },
         BluetoothEvent::DeviceDisconnected(device) => {
            iface
               .device_disconnected(&device.to_json().to_string())
               .await?;
         },
      }
      Ok(())
   }

   async fn spawn_dispatcher(self: Arc<Self>, connection: Connection) -> Result<()> {
      let iface = connection
         .object_server()
         .interface::<_, SessionService>(OBJECT_PATH)
         .await?;
      tokio::spawn(async move {
         while let Some(event) = self.recv().await {
            if let Err(e) = self.dispatch(&iface, event).await {
               warn!("Error dispatching event: {e}");
            }
         }
      });

      Ok(())
   }
}
