//! Seam to the platform's location service.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Default time allowed for a position fix.
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(15);
/// Default maximum age of a cached fix that may be returned.
pub const DEFAULT_MAXIMUM_AGE: Duration = Duration::from_secs(10);

/// Parameters of a one-shot position request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationOptions {
   pub high_accuracy: bool,
   pub timeout: Duration,
   pub maximum_age: Duration,
}

impl Default for LocationOptions {
   fn default() -> Self {
      Self {
         high_accuracy: true,
         timeout: DEFAULT_LOCATION_TIMEOUT,
         maximum_age: DEFAULT_MAXIMUM_AGE,
      }
   }
}

/// A position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
   pub latitude: f64,
   pub longitude: f64,
   /// Accuracy radius in meters.
   pub accuracy: f64,
   pub timestamp: SystemTime,
}

impl Position {
   /// Age of the fix relative to `now`; fixes from the future count as fresh.
   pub fn age(&self, now: SystemTime) -> Duration {
      now.duration_since(self.timestamp).unwrap_or_default()
   }
}

/// Platform location API.
#[async_trait]
pub trait LocationProvider: Send + Sync {
   /// Obtains a single current position honoring `options`.
   async fn current_position(&self, options: &LocationOptions) -> Result<Position>;
}
