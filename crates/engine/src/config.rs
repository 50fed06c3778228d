//! Configuration management

use crate::engine::EngineOptions;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub watch: WatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
    /// Log file; standard error when absent. `~` is expanded.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            file: None,
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "info".to_string()
    }

    /// Log file path with `~` expanded
    pub fn file_path(&self) -> Option<PathBuf> {
        self.file
            .as_deref()
            .map(|f| PathBuf::from(shellexpand::tilde(f).as_ref()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsbSettings {
    /// VID:PID allow-list, e.g. `0x0781:*`; empty allows every device
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Drop records missing from this many consecutive polls; never when absent
    #[serde(default)]
    pub evict_after_missed_polls: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Seconds between polls in watch mode
    #[serde(default = "WatchSettings::default_interval")]
    pub interval_secs: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval(),
        }
    }
}

impl WatchSettings {
    fn default_interval() -> u64 {
        2
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl EngineConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-drives/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-drives").join("config.toml")
        } else {
            PathBuf::from(".config/usb-drives/config.toml")
        }
    }

    /// Engine options derived from this configuration
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            filters: self.usb.filters.clone(),
            evict_after_missed_polls: self.registry.evict_after_missed_polls,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        Self::validate_log_level(&self.logging.level)?;

        // Validate USB filters (VID:PID format)
        for filter in &self.usb.filters {
            Self::validate_filter(filter)?;
        }

        if self.registry.evict_after_missed_polls == Some(0) {
            return Err(anyhow!(
                "Invalid evict_after_missed_polls 0, must be at least 1 (omit to never evict)"
            ));
        }

        if self.watch.interval_secs == 0 {
            return Err(anyhow!("Invalid watch interval 0, must be at least 1 second"));
        }

        Ok(())
    }

    /// Validate a log level name
    pub fn validate_log_level(level: &str) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }

    /// Validate a USB device filter pattern (VID:PID)
    fn validate_filter(filter: &str) -> Result<()> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')",
                filter
            ));
        }

        let (vid, pid) = (parts[0], parts[1]);

        if vid != "*" {
            Self::validate_hex_id(vid, "VID")?;
        }

        if pid != "*" {
            Self::validate_hex_id(pid, "PID")?;
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                    name,
                    id
                )
            })?;

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

        Ok(())
    }
}

/// Load a configuration file, expanding `~` in the path
pub fn load_config(path: &str) -> Result<EngineConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    EngineConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert!(config.usb.filters.is_empty());
        assert_eq!(config.registry.evict_after_missed_polls, None);
        assert_eq!(config.watch.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_validate_filter_valid() {
        assert!(EngineConfig::validate_filter("0x1234:0x5678").is_ok());
        assert!(EngineConfig::validate_filter("0x1234:*").is_ok());
        assert!(EngineConfig::validate_filter("*:0x5678").is_ok());
        assert!(EngineConfig::validate_filter("*:*").is_ok());
        assert!(EngineConfig::validate_filter("0xABCD:0xEF01").is_ok());
    }

    #[test]
    fn test_validate_filter_invalid() {
        assert!(EngineConfig::validate_filter("1234:5678").is_err());
        assert!(EngineConfig::validate_filter("0x1234").is_err());
        assert!(EngineConfig::validate_filter("0x1234:0x5678:0x9abc").is_err());
        assert!(EngineConfig::validate_filter("0xGHIJ:0x5678").is_err());
        assert!(EngineConfig::validate_filter("0x12345:0x5678").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = EngineConfig::default();
        config.usb.filters = vec!["0x0781:*".to_string()];
        config.registry.evict_after_missed_polls = Some(5);

        let toml_str = toml::to_string(&config).unwrap();
        let parsed = EngineConfig::from_toml(&toml_str).unwrap();

        assert_eq!(parsed.usb.filters, config.usb.filters);
        assert_eq!(parsed.registry.evict_after_missed_polls, Some(5));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = EngineConfig::default();
        config.registry.evict_after_missed_polls = Some(0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.watch.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_options() {
        let mut config = EngineConfig::default();
        config.usb.filters = vec!["*:0x5678".to_string()];
        config.registry.evict_after_missed_polls = Some(3);

        let options = config.engine_options();
        assert_eq!(options.filters, vec!["*:0x5678".to_string()]);
        assert_eq!(options.evict_after_missed_polls, Some(3));
    }

    #[test]
    fn test_log_file_tilde_expansion() {
        let settings = LoggingSettings {
            level: "info".to_string(),
            file: Some("/var/log/usb-drives.log".to_string()),
        };
        assert_eq!(
            settings.file_path(),
            Some(PathBuf::from("/var/log/usb-drives.log"))
        );

        let home = LoggingSettings {
            level: "info".to_string(),
            file: Some("~/usb.log".to_string()),
        };
        assert!(!home.file_path().unwrap().starts_with("~"));
    }
}
