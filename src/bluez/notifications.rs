//! Toasts as freedesktop desktop notifications.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use zbus::{Connection, proxy, zvariant::Value};

use crate::{config::NotificationConfig, error::Result, notify::Notifier};

#[proxy(
   interface = "org.freedesktop.Notifications",
   default_service = "org.freedesktop.Notifications",
   default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
   fn notify(
      &self,
      app_name: &str,
      replaces_id: u32,
      app_icon: &str,
      summary: &str,
      body: &str,
      actions: &[&str],
      hints: HashMap<&str, Value<'_>>,
      expire_timeout: i32,
   ) -> zbus::Result<u32>;
}

/// [`Notifier`] showing each toast as a desktop notification.
pub struct DesktopNotifier {
   proxy: NotificationsProxy<'static>,
   app_name: String,
   expire_timeout: i32,
}

impl DesktopNotifier {
   pub async fn connect(config: &NotificationConfig) -> Result<Self> {
      let connection = Connection::session().await?;
      let proxy = NotificationsProxy::new(&connection).await?;
      Ok(Self {
         proxy,
         app_name: config.app_name.clone(),
         expire_timeout: config.expire_timeout_ms,
      })
   }
}

#[async_trait]
impl Notifier for DesktopNotifier {
   async fn toast(&self, message: &str) -> Result<()> {
      let id = self
         .proxy
         .notify(
            &self.app_name,
            0,
            "bluetooth",
            &self.app_name,
            message,
            &[],
            HashMap::new(),
            self.expire_timeout,
         )
         .await?;
      debug!("Shown notification {id}: {message}");
      Ok(())
   }
}
