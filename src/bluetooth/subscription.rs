//! Event subscriptions as scoped resources.

use std::fmt;

use log::{debug, warn};

use crate::{error::Result, event::EventKind};

type Release = Box<dyn FnOnce() -> Result<()> + Send>;

/// A live event registration.
///
/// [`Subscription::release`] consumes the subscription, so it cannot be used
/// afterwards. A subscription dropped while still live is released on drop.
pub struct Subscription {
   kind: EventKind,
   release: Option<Release>,
}

impl Subscription {
   pub fn new<F>(kind: EventKind, release: F) -> Self
   where
      F: FnOnce() -> Result<()> + Send + 'static,
   {
      Self {
         kind,
         release: Some(Box::new(release)),
      }
   }

   pub const fn kind(&self) -> EventKind {
      self.kind
   }

   /// Removes the registration.
   pub fn release(mut self) -> Result<()> {
      match self.release.take() {
         Some(release) => release(),
         None => Ok(()),
      }
   }
}

impl Drop for Subscription {
   fn drop(&mut self) {
      if let Some(release) = self.release.take() {
         debug!("Releasing dropped {} subscription", self.kind);
         if let Err(e) = release() {
            warn!("Failed to release {} subscription: {e}", self.kind);
         }
      }
   }
}

impl fmt::Debug for Subscription {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Subscription")
         .field("kind", &self.kind)
         .field("live", &self.release.is_some())
         .finish()
   }
}

/// Releases every subscription in order. A failing release is logged and the
/// remaining subscriptions are still released.
pub fn cleanup_subscriptions(subscriptions: impl IntoIterator<Item = Subscription>) {
   for subscription in subscriptions {
      let kind = subscription.kind();
      if let Err(e) = subscription.release() {
         warn!("Failed to release {kind} subscription: {e}");
      }
   }
}
