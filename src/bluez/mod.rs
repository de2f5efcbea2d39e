//! Linux bindings: BlueZ for Bluetooth, GeoClue2 for location and the
//! freedesktop notification service for toasts.

pub mod adapter;
pub mod location;
pub mod notifications;
pub mod permissions;
pub mod rfcomm;

pub use adapter::BluerBinding;
pub use location::GeoClueLocation;
pub use notifications::DesktopNotifier;
pub use permissions::SystemPermissions;
