//! Application configuration.
//!
//! Stored as TOML in the platform data directory. A missing file yields the
//! defaults; missing keys fall back to their defaults individually.

use crate::sensors::SensorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default FTP in watts.
pub const DEFAULT_FTP: u16 = 250;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Rider settings
    pub rider: RiderSettings,
    /// Sensor settings
    pub sensors: SensorSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            rider: RiderSettings::default(),
            sensors: SensorSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !RiderSettings::validate_ftp(self.rider.ftp) {
            return Err(ConfigError::InvalidValue(format!(
                "rider.ftp must be between 50 and 600 watts, got {}",
                self.rider.ftp
            )));
        }
        if self.sensors.scan_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "sensors.scan_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiderSettings {
    /// Functional Threshold Power in watts (50-600)
    pub ftp: u16,
}

impl Default for RiderSettings {
    fn default() -> Self {
        Self { ftp: DEFAULT_FTP }
    }
}

impl RiderSettings {
    /// Update FTP.
    pub fn set_ftp(&mut self, ftp: u16) -> Result<(), ConfigError> {
        if !Self::validate_ftp(ftp) {
            return Err(ConfigError::InvalidValue(
                "FTP must be between 50 and 600 watts".to_string(),
            ));
        }
        self.ftp = ftp;
        Ok(())
    }

    /// Validate FTP value (50-600 watts).
    pub fn validate_ftp(ftp: u16) -> bool {
        (50..=600).contains(&ftp)
    }
}

/// Sensor-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// How long to scan before giving up
    pub scan_timeout_secs: u64,
    /// Device-name prefix to pick; any device with a known service if unset
    pub name_filter: Option<String>,
    /// Idle time before crank cadence reports 0 RPM
    pub cadence_idle_timeout_ms: u64,
    /// Pause after each control point write
    pub control_write_settle_ms: u64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 10,
            name_filter: None,
            cadence_idle_timeout_ms: 2000,
            control_write_settle_ms: 200,
        }
    }
}

impl SensorSettings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Stream timing derived from these settings.
    pub fn to_sensor_config(&self) -> SensorConfig {
        SensorConfig {
            cadence_idle_timeout: Duration::from_millis(self.cadence_idle_timeout_ms),
            control_write_settle: Duration::from_millis(self.control_write_settle_ms),
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "ridelink", "RideLink")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut config = load_config_from(&get_config_path())?;
    config.data_dir = get_data_dir();
    Ok(config)
}

/// Load configuration from `path`, or defaults if it does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;

    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save configuration to `path`, creating parent directories.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;
    tracing::info!("Saved config to {}", path.display());

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
