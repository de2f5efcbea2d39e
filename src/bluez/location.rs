//! Location fixes from GeoClue2 over the system bus.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use tokio::time;
use zbus::{
   Connection, proxy,
   zvariant::{ObjectPath, OwnedObjectPath},
};

use crate::{
   error::{GateError, Result},
   permissions::{LocationOptions, LocationProvider, Position},
};

/// GeoClue accuracy level for city-level fixes
pub const ACCURACY_CITY: u32 = 4;
/// GeoClue accuracy level for exact fixes
pub const ACCURACY_EXACT: u32 = 8;

#[proxy(
   interface = "org.freedesktop.GeoClue2.Manager",
   default_service = "org.freedesktop.GeoClue2",
   default_path = "/org/freedesktop/GeoClue2/Manager"
)]
pub trait Manager {
   fn get_client(&self) -> zbus::Result<OwnedObjectPath>;

   #[zbus(property)]
   fn available_accuracy_level(&self) -> zbus::Result<u32>;
}

#[proxy(
   interface = "org.freedesktop.GeoClue2.Client",
   default_service = "org.freedesktop.GeoClue2"
)]
trait Client {
   fn start(&self) -> zbus::Result<()>;

   fn stop(&self) -> zbus::Result<()>;

   #[zbus(property)]
   fn set_desktop_id(&self, id: &str) -> zbus::Result<()>;

   #[zbus(property)]
   fn set_requested_accuracy_level(&self, level: u32) -> zbus::Result<()>;

   #[zbus(signal)]
   fn location_updated(&self, old_path: ObjectPath<'_>, new_path: ObjectPath<'_>)
   -> zbus::Result<()>;
}

#[proxy(
   interface = "org.freedesktop.GeoClue2.Location",
   default_service = "org.freedesktop.GeoClue2"
)]
trait Location {
   #[zbus(property)]
   fn latitude(&self) -> zbus::Result<f64>;

   #[zbus(property)]
   fn longitude(&self) -> zbus::Result<f64>;

   #[zbus(property)]
   fn accuracy(&self) -> zbus::Result<f64>;

   #[zbus(property)]
   fn timestamp(&self) -> zbus::Result<(u64, u64)>;
}

/// [`LocationProvider`] backed by GeoClue2.
pub struct GeoClueLocation {
   connection: Connection,
   desktop_id: String,
}

impl GeoClueLocation {
   pub const fn new(connection: Connection, desktop_id: String) -> Self {
      Self {
         connection,
         desktop_id,
      }
   }

   async fn read_position(&self, path: OwnedObjectPath) -> Result<Position> {
      let location = LocationProxy::builder(&self.connection)
         .path(path)?
         .build()
         .await?;
      let (secs, micros) = location.timestamp().await?;
      Ok(Position {
         latitude: location.latitude().await?,
         longitude: location.longitude().await?,
         accuracy: location.accuracy().await?,
         timestamp: UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(micros),
      })
   }

   async fn wait_for_fix(
      &self,
      client: &ClientProxy<'_>,
      options: &LocationOptions,
   ) -> Result<Position> {
      let mut updates = client.receive_location_updated().await?;
      client.start().await?;

      while let Some(signal) = updates.next().await {
         let args = signal.args()?;
         let path = OwnedObjectPath::from(args.new_path().to_owned());
         let position = self.read_position(path).await?;
         let age = position.age(SystemTime::now());
         if age <= options.maximum_age {
            return Ok(position);
         }
         debug!("Ignoring stale fix ({age:?} old)");
      }
      Err(GateError::LocationUnavailable(
         "GeoClue stopped sending updates".into(),
      ))
   }
}

#[async_trait]
impl LocationProvider for GeoClueLocation {
   async fn current_position(&self, options: &LocationOptions) -> Result<Position> {
      let manager = ManagerProxy::new(&self.connection).await?;
      let client_path = manager.get_client().await?;
      let client = ClientProxy::builder(&self.connection)
         .path(client_path)?
         .build()
         .await?;

      client.set_desktop_id(&self.desktop_id).await?;
      let level = if options.high_accuracy {
         ACCURACY_EXACT
      } else {
         ACCURACY_CITY
      };
      client.set_requested_accuracy_level(level).await?;

      let result = time::timeout(options.timeout, self.wait_for_fix(&client, options))
         .await
         .unwrap_or_else(|_| Err(GateError::LocationTimeout(options.timeout.as_secs())));

      if let Err(e) = client.stop().await {
         warn!("Failed to stop GeoClue client: {e}");
      }
      result
   }
}
