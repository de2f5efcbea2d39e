//! Permission identifiers and the fixed set the gateway manages.

use serde::{Deserialize, Serialize};

/// A platform capability that must be granted before Bluetooth or location
/// operations are usable.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Hash,
   Serialize,
   Deserialize,
   strum::Display,
   strum::EnumString,
   strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
   BluetoothScan,
   BluetoothConnect,
   BluetoothAdvertise,
   AccessFineLocation,
   AccessCoarseLocation,
}

/// Outcome of requesting a single permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionStatus {
   Granted,
   Denied,
   NeverAskAgain,
}

impl PermissionStatus {
   pub const fn is_granted(self) -> bool {
      matches!(self, Self::Granted)
   }
}

/// Immutable, ordered set of permissions handed to the gateway at
/// construction. Duplicates are dropped, first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Permission>", into = "Vec<Permission>")]
pub struct PermissionSet(Box<[Permission]>);

impl PermissionSet {
   pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
      let mut out: Vec<Permission> = Vec::new();
      for permission in permissions {
         if !out.contains(&permission) {
            out.push(permission);
         }
      }
      Self(out.into_boxed_slice())
   }

   pub fn as_slice(&self) -> &[Permission] {
      &self.0
   }

   pub fn iter(&self) -> impl ExactSizeIterator<Item = Permission> + '_ {
      self.0.iter().copied()
   }

   pub fn len(&self) -> usize {
      self.0.len()
   }

   pub fn is_empty(&self) -> bool {
      self.0.is_empty()
   }

   pub fn contains(&self, permission: Permission) -> bool {
      self.0.contains(&permission)
   }
}

impl Default for PermissionSet {
   /// Bluetooth scan, Bluetooth connect and fine location.
   fn default() -> Self {
      Self::new([
         Permission::BluetoothScan,
         Permission::BluetoothConnect,
         Permission::AccessFineLocation,
      ])
   }
}

impl From<Vec<Permission>> for PermissionSet {
   fn from(permissions: Vec<Permission>) -> Self {
      Self::new(permissions)
   }
}

impl From<PermissionSet> for Vec<Permission> {
   fn from(set: PermissionSet) -> Self {
      set.0.into_vec()
   }
}
