//! Permission backend for Linux desktops.
//!
//! There is no runtime prompt on Linux; access is governed by D-Bus policy.
//! A permission counts as granted when the service behind it answers:
//! Bluetooth permissions need at least one BlueZ adapter, location
//! permissions need GeoClue to offer the matching accuracy level.

use async_trait::async_trait;
use bluer::Session;
use log::debug;
use zbus::Connection;

use crate::{
   bluez::location::{ACCURACY_CITY, ACCURACY_EXACT, ManagerProxy},
   error::Result,
   permissions::{Permission, PermissionBackend, PermissionStatus},
};

pub struct SystemPermissions {
   session: Session,
   connection: Connection,
}

impl SystemPermissions {
   pub const fn new(session: Session, connection: Connection) -> Self {
      Self {
         session,
         connection,
      }
   }

   async fn has_adapter(&self) -> Result<bool> {
      Ok(!self.session.adapter_names().await?.is_empty())
   }

   async fn location_level(&self) -> Result<u32> {
      let manager = ManagerProxy::new(&self.connection).await?;
      Ok(manager.available_accuracy_level().await?)
   }
}

#[async_trait]
impl PermissionBackend for SystemPermissions {
   async fn request(
      &self,
      permissions: &[Permission],
   ) -> Result<Vec<(Permission, PermissionStatus)>> {
      let mut statuses = Vec::with_capacity(permissions.len());
      for permission in permissions {
         let status = if self.check(*permission).await? {
            PermissionStatus::Granted
         } else {
            PermissionStatus::Denied
         };
         statuses.push((*permission, status));
      }
      Ok(statuses)
   }

   async fn check(&self, permission: Permission) -> Result<bool> {
      let granted = match permission {
         Permission::BluetoothScan
         | Permission::BluetoothConnect
         | Permission::BluetoothAdvertise => self.has_adapter().await?,
         Permission::AccessFineLocation => self.location_level().await? >= ACCURACY_EXACT,
         Permission::AccessCoarseLocation => self.location_level().await? >= ACCURACY_CITY,
      };
      debug!("Permission {permission}: granted={granted}");
      Ok(granted)
   }
}
