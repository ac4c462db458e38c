//! Persisted configuration.
//!
//! Loaded from `~/.config/magic-led/config.toml`. Every field is optional;
//! values only fill in command-line arguments the user left out.
//!
//! ```toml
//! [device]
//! id = "AA:BB:CC:DD:EE:FF"
//! name = "LEDnetWF"
//!
//! [defaults]
//! rgb = [255, 180, 120]
//!
//! [defaults.alarms]
//! alarm-on = "07:00/0011111"
//! alarm-off = "23:30"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::alarm::AlarmKind;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// BLE address or platform peripheral id
    pub id: Option<String>,
    /// Advertised name prefix
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub rgb: [u8; 3],
    pub alarms: AlarmDefaults,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            rgb: [255, 255, 255],
            alarms: AlarmDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AlarmDefaults {
    pub alarm_on: Option<String>,
    pub alarm_off: Option<String>,
    pub alarm_rgb: Option<String>,
    pub alarm_effect: Option<String>,
}

impl AlarmDefaults {
    pub fn for_kind(&self, kind: AlarmKind) -> Option<&str> {
        match kind {
            AlarmKind::On => self.alarm_on.as_deref(),
            AlarmKind::Off => self.alarm_off.as_deref(),
            AlarmKind::Rgb => self.alarm_rgb.as_deref(),
            AlarmKind::Effect => self.alarm_effect.as_deref(),
        }
    }
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse from TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the default config file, or defaults if there is none.
    pub fn load_default() -> Result<Self> {
        let path = default_config_path();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        info!("Loading config from {}", path.display());
        Self::load(&path)
    }

    /// Load `path` if given, otherwise the default location.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }
}

/// Path of the default config file.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn config_dir() -> PathBuf {
    if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config).join("magic-led")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config/magic-led")
    } else {
        PathBuf::from("/tmp/magic-led")
    }
}
