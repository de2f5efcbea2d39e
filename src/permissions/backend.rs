//! Seam to the platform's runtime permission system.

use async_trait::async_trait;

use crate::{
   error::Result,
   permissions::{Permission, PermissionStatus},
};

/// Platform permission API.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
   /// Requests every permission in `permissions`, possibly prompting the
   /// user. Permissions missing from the result are treated as denied.
   async fn request(
      &self,
      permissions: &[Permission],
   ) -> Result<Vec<(Permission, PermissionStatus)>>;

   /// Checks a single permission without prompting.
   async fn check(&self, permission: Permission) -> Result<bool>;
}
