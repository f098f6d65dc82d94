//! Configuration file management.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hygrolink_core::{HubConfig, ScanOptions, SessionOptions};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier, name or alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Scan duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_secs: Option<u64>,

    /// Clear the device list when a scan starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_on_scan: Option<bool>,

    /// Only keep devices that advertise a name
    #[serde(default)]
    pub named_only: bool,

    /// Sensor GATT service UUID, if the device uses a non-default one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_uuid: Option<String>,

    /// Use Fahrenheit for temperature
    #[serde(default)]
    pub fahrenheit: bool,

    /// Device aliases (friendly name -> device identifier)
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hygrolink")
            .join("config.toml")
    }

    /// Load config from `path`, or return default if it is missing or invalid
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Build the hub configuration these settings describe.
    pub fn hub_config(&self) -> Result<HubConfig> {
        let mut scan = ScanOptions::new().named_only(self.named_only);
        if let Some(secs) = self.scan_secs {
            scan = scan.duration_secs(secs);
        }
        if let Some(reset) = self.reset_on_scan {
            scan = scan.reset_on_start(reset);
        }

        let mut session = SessionOptions::new();
        if let Some(uuid) = &self.service_uuid {
            let uuid = Uuid::parse_str(uuid)
                .with_context(|| format!("Invalid service_uuid in config: {}", uuid))?;
            session = session.service_uuid(uuid);
        }

        let config = HubConfig::new().scan(scan).session(session);
        config.validate()?;
        Ok(config)
    }
}

/// Resolve device from arg (or env var, via clap) or config, applying aliases.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device
        .or_else(|| config.device.clone())
        .map(|d| resolve_alias(&d, config))
}

/// Resolve an alias to its device identifier, or return the original if not an alias.
pub fn resolve_alias(device: &str, config: &Config) -> String {
    config
        .aliases
        .get(device)
        .cloned()
        .unwrap_or_else(|| device.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hygrolink_core::uuids::SENSOR_SERVICE;
    use tempfile::TempDir;

    fn with_aliases() -> Config {
        let mut config = Config::default();
        config
            .aliases
            .insert("attic".to_string(), "AA:BB:CC:DD:EE:FF".to_string());
        config
    }

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();
        assert!(config.device.is_none());
        assert!(config.aliases.is_empty());
        assert!(!config.fahrenheit);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str("device = \"attic\"\nscan_secs = 5\n").unwrap();
        assert_eq!(config.device.as_deref(), Some("attic"));
        assert_eq!(config.scan_secs, Some(5));
        assert!(config.reset_on_scan.is_none());
        assert!(!config.named_only);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = with_aliases();
        config.device = Some("attic".to_string());
        config.scan_secs = Some(20);
        config.fahrenheit = true;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Config::load_from(&dir.path().join("absent.toml")), Config::default());
    }

    #[test]
    fn test_load_invalid_file_gives_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan_secs = \"soon\"").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_resolve_alias() {
        let config = with_aliases();
        assert_eq!(resolve_alias("attic", &config), "AA:BB:CC:DD:EE:FF");
        assert_eq!(resolve_alias("11:22:33:44:55:66", &config), "11:22:33:44:55:66");
    }

    #[test]
    fn test_resolve_device_prefers_argument() {
        let mut config = with_aliases();
        config.device = Some("attic".to_string());

        assert_eq!(
            resolve_device(Some("cellar".to_string()), &config).as_deref(),
            Some("cellar")
        );
        assert_eq!(
            resolve_device(None, &config).as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
        assert_eq!(resolve_device(None, &Config::default()), None);
    }

    #[test]
    fn test_hub_config_from_settings() {
        let config = Config {
            scan_secs: Some(3),
            reset_on_scan: Some(false),
            named_only: true,
            ..Config::default()
        };
        let hub = config.hub_config().unwrap();
        assert_eq!(hub.scan.duration, Duration::from_secs(3));
        assert!(!hub.scan.reset_on_start);
        assert!(hub.scan.named_only);
        assert_eq!(hub.session.service_uuid, SENSOR_SERVICE);
    }

    #[test]
    fn test_hub_config_rejects_bad_values() {
        let zero = Config {
            scan_secs: Some(0),
            ..Config::default()
        };
        assert!(zero.hub_config().is_err());

        let bad_uuid = Config {
            service_uuid: Some("not-a-uuid".to_string()),
            ..Config::default()
        };
        assert!(bad_uuid.hub_config().is_err());
    }
}
