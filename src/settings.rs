use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{BAUD_RATE, HEARTBEAT_TIMEOUT_MS, LinkSettings, STREAM_RATE_HZ};
use crate::error::SettingsError;

/// Link settings remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentSettings {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_stream_rate_hz")]
    pub stream_rate_hz: u16,
}

fn default_baud() -> u32 {
    BAUD_RATE
}

fn default_heartbeat_timeout_ms() -> u64 {
    HEARTBEAT_TIMEOUT_MS
}

fn default_stream_rate_hz() -> u16 {
    STREAM_RATE_HZ
}

impl Default for PersistentSettings {
    fn default() -> Self {
        Self {
            address: None,
            baud: BAUD_RATE,
            heartbeat_timeout_ms: HEARTBEAT_TIMEOUT_MS,
            stream_rate_hz: STREAM_RATE_HZ,
        }
    }
}

impl PersistentSettings {
    /// `<config dir>/pixhawk_monitor/settings.json`
    pub fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("pixhawk_monitor").join("settings.json")
    }

    /// Load from the default location, falling back to defaults if the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        Self::load_or_default(Self::settings_path())
    }

    /// Like [`load`](Self::load), but from an explicit path.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(settings) => {
                info!(path = %path.display(), "loaded settings");
                settings
            }
            Err(SettingsError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!("no settings file found, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring settings file");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path();
        self.save_to_file(&path)?;
        Ok(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Settings for `connect`; without a remembered address the first
    /// available serial port is used.
    pub fn to_link_settings(&self) -> LinkSettings {
        let mut settings = match &self.address {
            Some(address) => LinkSettings::new(address.clone()),
            None => LinkSettings::default(),
        };
        settings.baud = self.baud;
        settings.heartbeat_timeout = Duration::from_millis(self.heartbeat_timeout_ms);
        settings.stream_rate_hz = self.stream_rate_hz;
        settings
    }
}

impl From<&LinkSettings> for PersistentSettings {
    fn from(settings: &LinkSettings) -> Self {
        Self {
            address: Some(settings.address.clone()),
            baud: settings.baud,
            heartbeat_timeout_ms: u64::try_from(settings.heartbeat_timeout.as_millis())
                .unwrap_or(u64::MAX),
            stream_rate_hz: settings.stream_rate_hz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pixhawk_monitor_test_{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_save_and_load() {
        let path = scratch_file("roundtrip.json");
        let settings = PersistentSettings {
            address: Some("tcp:127.0.0.1:5760".to_string()),
            baud: 57_600,
            heartbeat_timeout_ms: 2_500,
            stream_rate_hz: 10,
        };

        settings.save_to_file(&path).unwrap();
        let loaded = PersistentSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: PersistentSettings =
            serde_json::from_str(r#"{ "address": "COM7" }"#).unwrap();
        assert_eq!(settings.address.as_deref(), Some("COM7"));
        assert_eq!(settings.baud, BAUD_RATE);
        assert_eq!(settings.heartbeat_timeout_ms, HEARTBEAT_TIMEOUT_MS);
        assert_eq!(settings.stream_rate_hz, STREAM_RATE_HZ);
    }

    #[test]
    fn test_corrupt_file_is_a_parse_error() {
        let path = scratch_file("corrupt.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = PersistentSettings::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_link_settings_conversion() {
        let link = LinkSettings {
            address: "/dev/ttyUSB0".to_string(),
            baud: 921_600,
            heartbeat_timeout: Duration::from_millis(1_500),
            stream_rate_hz: 2,
        };

        let stored = PersistentSettings::from(&link);
        assert_eq!(stored.to_link_settings(), link);
    }

    #[test]
    fn test_huge_timeout_saturates_instead_of_truncating() {
        let mut link = LinkSettings::new("COM4");
        link.heartbeat_timeout = Duration::MAX;

        let stored = PersistentSettings::from(&link);
        assert_eq!(stored.heartbeat_timeout_ms, u64::MAX);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let path = scratch_file("does_not_exist.json");
        let err = PersistentSettings::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
        assert_eq!(
            PersistentSettings::load_or_default(&path),
            PersistentSettings::default()
        );
    }

    #[test]
    fn test_unreadable_path_falls_back_to_defaults() {
        // A directory exists but can't be read as a file.
        let path = scratch_file("settings_dir");
        fs::create_dir_all(&path).unwrap();

        let err = PersistentSettings::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Io(ref e) if e.kind() != io::ErrorKind::NotFound));
        assert_eq!(
            PersistentSettings::load_or_default(&path),
            PersistentSettings::default()
        );

        let _ = fs::remove_dir(&path);
    }
}
