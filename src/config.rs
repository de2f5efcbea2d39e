//! Configuration management.
//!
//! Loads the permission set, location options, Bluetooth binding parameters
//! and notification settings from `bluegate/config.toml`.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
   error::{GateError, Result},
   permissions::{LocationOptions, PermissionSet},
};

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
   #[serde(default)]
   pub permissions: PermissionSet,

   /// Command launched by `open_settings`.
   #[serde(default = "default_settings_command")]
   pub settings_command: Vec<String>,

   #[serde(default)]
   pub location: LocationConfig,

   #[serde(default)]
   pub bluetooth: BluetoothConfig,

   #[serde(default)]
   pub notifications: NotificationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocationConfig {
   #[serde(default = "default_true")]
   pub high_accuracy: bool,

   #[serde(default = "default_location_timeout")]
   pub timeout_ms: u64,

   #[serde(default = "default_maximum_age")]
   pub maximum_age_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BluetoothConfig {
   /// Adapter name such as `hci0`; the default adapter when unset.
   #[serde(default)]
   pub adapter: Option<String>,

   #[serde(default = "default_rfcomm_channel")]
   pub rfcomm_channel: u8,

   #[serde(default = "default_discovery_window")]
   pub discovery_window_ms: u64,

   /// Byte terminating one message in the read buffer.
   #[serde(default = "default_read_delimiter")]
   pub read_delimiter: u8,

   /// Bytes kept in a link's read buffer; older bytes are dropped beyond it.
   #[serde(default = "default_max_buffer")]
   pub max_buffer: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationConfig {
   /// Show notices as desktop notifications instead of log lines only.
   #[serde(default = "default_true")]
   pub desktop: bool,

   #[serde(default = "default_app_name")]
   pub app_name: String,

   #[serde(default = "default_expire_timeout")]
   pub expire_timeout_ms: i32,
}

const fn default_true() -> bool {
   true
}

const fn default_location_timeout() -> u64 {
   15_000
}

const fn default_maximum_age() -> u64 {
   10_000
}

const fn default_rfcomm_channel() -> u8 {
   1
}

const fn default_discovery_window() -> u64 {
   12_000
}

const fn default_read_delimiter() -> u8 {
   b'\n'
}

const fn default_max_buffer() -> usize {
   64 * 1024
}

const fn default_expire_timeout() -> i32 {
   4_000
}

fn default_app_name() -> String {
   "bluegate".to_string()
}

fn default_settings_command() -> Vec<String> {
   vec!["blueman-manager".to_string()]
}

impl Default for LocationConfig {
   fn default() -> Self {
      Self {
         high_accuracy: default_true(),
         timeout_ms: default_location_timeout(),
         maximum_age_ms: default_maximum_age(),
      }
   }
}

impl Default for BluetoothConfig {
   fn default() -> Self {
      Self {
         adapter: None,
         rfcomm_channel: default_rfcomm_channel(),
         discovery_window_ms: default_discovery_window(),
         read_delimiter: default_read_delimiter(),
         max_buffer: default_max_buffer(),
      }
   }
}

impl Default for NotificationConfig {
   fn default() -> Self {
      Self {
         desktop: default_true(),
         app_name: default_app_name(),
         expire_timeout_ms: default_expire_timeout(),
      }
   }
}

impl Default for Config {
   fn default() -> Self {
      Self {
         permissions: PermissionSet::default(),
         settings_command: default_settings_command(),
         location: LocationConfig::default(),
         bluetooth: BluetoothConfig::default(),
         notifications: NotificationConfig::default(),
      }
   }
}

impl LocationConfig {
   pub const fn options(&self) -> LocationOptions {
      LocationOptions {
         high_accuracy: self.high_accuracy,
         timeout: Duration::from_millis(self.timeout_ms),
         maximum_age: Duration::from_millis(self.maximum_age_ms),
      }
   }
}

impl BluetoothConfig {
   pub const fn discovery_window(&self) -> Duration {
      Duration::from_millis(self.discovery_window_ms)
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing defaults there if it does not
   /// exist.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("BLUEGATE_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Some(dir) = dirs::config_dir() {
         dir
      } else {
         return Err(GateError::ConfigDirNotFound);
      };

      Ok(config_dir.join("bluegate").join("config.toml"))
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::permissions::Permission;

   #[test]
   fn test_missing_file_writes_defaults() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("nested").join("config.toml");

      let config = Config::load_from(&path).unwrap();
      assert_eq!(config, Config::default());
      assert!(path.exists());

      let reloaded = Config::load_from(&path).unwrap();
      assert_eq!(reloaded, config);
   }

   #[test]
   fn test_partial_file_fills_defaults() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("config.toml");
      fs::write(
         &path,
         r#"
permissions = ["bluetooth_connect", "bluetooth_connect"]

[bluetooth]
adapter = "hci1"
rfcomm_channel = 3
"#,
      )
      .unwrap();

      let config = Config::load_from(&path).unwrap();
      assert_eq!(config.permissions.as_slice(), &[Permission::BluetoothConnect]);
      assert_eq!(config.bluetooth.adapter.as_deref(), Some("hci1"));
      assert_eq!(config.bluetooth.rfcomm_channel, 3);
      assert_eq!(config.bluetooth.read_delimiter, b'\n');
      assert_eq!(config.bluetooth.max_buffer, 64 * 1024);
      assert_eq!(config.location, LocationConfig::default());
      assert_eq!(config.settings_command, default_settings_command());
   }

   #[test]
   fn test_location_options() {
      let options = LocationConfig::default().options();
      assert!(options.high_accuracy);
      assert_eq!(options.timeout, Duration::from_secs(15));
      assert_eq!(options.maximum_age, Duration::from_secs(10));
   }

   #[test]
   fn test_invalid_permission_rejected() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("config.toml");
      fs::write(&path, r#"permissions = ["camera"]"#).unwrap();
      assert!(matches!(Config::load_from(&path), Err(GateError::TomlParse(_))));
   }
}
