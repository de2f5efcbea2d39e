//! Permission gateway.
//!
//! Requests and checks a fixed [`PermissionSet`] and asks the location
//! service for a fix. Every operation reports failures through the log and
//! resolves to a boolean; none of them propagate errors.

use std::{sync::Arc, time::SystemTime};

use log::{debug, info, warn};
use tokio::time;

use crate::{
   error::{GateError, Result},
   permissions::{
      LocationOptions, LocationProvider, Permission, PermissionBackend, PermissionSet,
      PermissionStatus, Position,
   },
};

pub struct PermissionGateway {
   permissions: PermissionSet,
   location_options: LocationOptions,
   backend: Arc<dyn PermissionBackend>,
   location: Arc<dyn LocationProvider>,
}

impl PermissionGateway {
   pub fn new(
      permissions: PermissionSet,
      backend: Arc<dyn PermissionBackend>,
      location: Arc<dyn LocationProvider>,
   ) -> Self {
      Self {
         permissions,
         location_options: LocationOptions::default(),
         backend,
         location,
      }
   }

   #[must_use]
   pub const fn with_location_options(mut self, options: LocationOptions) -> Self {
      self.location_options = options;
      self
   }

   pub const fn permissions(&self) -> &PermissionSet {
      &self.permissions
   }

   pub const fn location_options(&self) -> &LocationOptions {
      &self.location_options
   }

   /// Requests the whole set. True iff every permission was granted.
   pub async fn request_all(&self) -> bool {
      let statuses = match self.backend.request(self.permissions.as_slice()).await {
         Ok(statuses) => statuses,
         Err(e) => {
            warn!("Permission request failed: {e}");
            return false;
         },
      };

      let denied: Vec<(Permission, PermissionStatus)> = self
         .permissions
         .iter()
         .filter_map(|permission| {
            let status = statuses
               .iter()
               .find(|(p, _)| *p == permission)
               .map_or(PermissionStatus::Denied, |(_, s)| *s);
            (!status.is_granted()).then_some((permission, status))
         })
         .collect();

      if denied.is_empty() {
         info!("All {} permissions granted", self.permissions.len());
         return true;
      }

      for (permission, status) in &denied {
         warn!("Permission {permission} not granted: {status}");
      }
      false
   }

   /// Checks the whole set without prompting. True iff every permission is
   /// granted.
   pub async fn check_all(&self) -> bool {
      let mut missing = Vec::new();
      for permission in self.permissions.iter() {
         match self.backend.check(permission).await {
            Ok(true) => {},
            Ok(false) => missing.push(permission),
            Err(e) => {
               warn!("Permission check for {permission} failed: {e}");
               return false;
            },
         }
      }

      if missing.is_empty() {
         debug!("Permission check passed");
         return true;
      }

      for permission in &missing {
         warn!("Permission {permission} missing");
      }
      false
   }

   /// Asks the location service for a one-shot fix. True on success.
   pub async fn request_location_service(&self) -> bool {
      match self.current_position().await {
         Ok(position) => {
            info!(
               "Location service available: fix ±{:.0}m, {:?} old",
               position.accuracy,
               position.age(SystemTime::now())
            );
            true
         },
         Err(e) => {
            warn!("Location service request failed: {e}");
            false
         },
      }
   }

   /// One-shot fix with the configured options, bounded by their timeout.
   pub async fn current_position(&self) -> Result<Position> {
      let options = self.location_options;
      let request = self.location.current_position(&options);
      time::timeout(options.timeout, request)
         .await
         .unwrap_or_else(|_| Err(GateError::LocationTimeout(options.timeout.as_secs())))
   }
}

#[cfg(test)]
mod tests {
   use std::time::Duration;

   use super::*;
   use crate::testing::{MockLocation, MockPermissions};

   const ALL: [Permission; 3] = [
      Permission::BluetoothScan,
      Permission::BluetoothConnect,
      Permission::AccessFineLocation,
   ];

   fn gateway(permissions: Arc<MockPermissions>, location: Arc<MockLocation>) -> PermissionGateway {
      PermissionGateway::new(PermissionSet::default(), permissions, location)
   }

   #[tokio::test]
   async fn test_request_all_over_every_combination() {
      for mask in 0u8..8 {
         let granted: Vec<Permission> = ALL
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, p)| *p)
            .collect();
         let backend = Arc::new(MockPermissions::granting(&granted));
         let gw = gateway(backend.clone(), Arc::new(MockLocation::fixed()));

         assert_eq!(gw.request_all().await, mask == 0b111, "mask {mask:03b}");
         assert_eq!(gw.check_all().await, mask == 0b111, "mask {mask:03b}");
         assert_eq!(backend.requests(), 1);
      }
   }

   #[tokio::test]
   async fn test_never_ask_again_counts_as_denied() {
      let backend = MockPermissions::granting(&ALL);
      backend.set_status(Permission::AccessFineLocation, PermissionStatus::NeverAskAgain);
      let gw = gateway(Arc::new(backend), Arc::new(MockLocation::fixed()));
      assert!(!gw.request_all().await);
   }

   #[tokio::test]
   async fn test_missing_status_counts_as_denied() {
      let backend = MockPermissions::granting(&ALL);
      backend.omit(Permission::BluetoothScan);
      let gw = gateway(Arc::new(backend), Arc::new(MockLocation::fixed()));
      assert!(!gw.request_all().await);
   }

   #[tokio::test]
   async fn test_backend_failure_yields_false() {
      let backend = MockPermissions::granting(&ALL);
      backend.fail();
      let gw = gateway(Arc::new(backend), Arc::new(MockLocation::fixed()));
      assert!(!gw.request_all().await);
      assert!(!gw.check_all().await);
   }

   #[tokio::test]
   async fn test_empty_set_is_trivially_granted() {
      let gw = PermissionGateway::new(
         PermissionSet::new([]),
         Arc::new(MockPermissions::granting(&[])),
         Arc::new(MockLocation::fixed()),
      );
      assert!(gw.request_all().await);
      assert!(gw.check_all().await);
   }

   #[tokio::test]
   async fn test_location_passes_options() {
      let location = Arc::new(MockLocation::fixed());
      let gw = gateway(Arc::new(MockPermissions::granting(&ALL)), location.clone());

      assert!(gw.request_location_service().await);
      let options = location.last_options().expect("provider not called");
      assert!(options.high_accuracy);
      assert_eq!(options.timeout, Duration::from_secs(15));
      assert_eq!(options.maximum_age, Duration::from_secs(10));
   }

   #[tokio::test]
   async fn test_location_failure_yields_false() {
      let gw = gateway(
         Arc::new(MockPermissions::granting(&ALL)),
         Arc::new(MockLocation::failing()),
      );
      assert!(!gw.request_location_service().await);
   }

   #[tokio::test(start_paused = true)]
   async fn test_location_within_timeout() {
      let gw = gateway(
         Arc::new(MockPermissions::granting(&ALL)),
         Arc::new(MockLocation::delayed(Duration::from_secs(14))),
      );
      assert!(gw.request_location_service().await);
   }

   #[tokio::test(start_paused = true)]
   async fn test_location_timeout_yields_false() {
      let gw = gateway(
         Arc::new(MockPermissions::granting(&ALL)),
         Arc::new(MockLocation::delayed(Duration::from_secs(20))),
      );
      assert!(!gw.request_location_service().await);

      let err = gw.current_position().await.unwrap_err();
      assert!(matches!(err, GateError::LocationTimeout(15)), "got {err}");
      assert_eq!(err.to_string(), "Location request timed out after 15s");
   }
}
