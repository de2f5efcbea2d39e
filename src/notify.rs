//! User-facing notices ("toasts").

use async_trait::async_trait;
use log::info;

use crate::error::Result;

/// Surfaces short messages to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
   async fn toast(&self, message: &str) -> Result<()>;
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
   async fn toast(&self, message: &str) -> Result<()> {
      info!("[toast] {message}");
      Ok(())
   }
}
