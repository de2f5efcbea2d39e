//! Runtime permission handling.
//!
//! This module provides the permission gateway along with the backend and
//! location-provider seams it delegates to.

pub mod backend;
pub mod gateway;
pub mod location;
pub mod set;

pub use backend::PermissionBackend;
pub use gateway::PermissionGateway;
pub use location::{LocationOptions, LocationProvider, Position};
pub use set::{Permission, PermissionSet, PermissionStatus};
