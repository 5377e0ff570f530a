//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; an empty file yields the defaults.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{CrashtrackError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
}

/// Credential store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_path")]
    pub path: String,
}

/// Which positioning backend to sample
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSourceKind {
    Serial,
    Fixed,
}

/// Position source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PositionConfig {
    #[serde(default = "default_position_source")]
    pub source: PositionSourceKind,

    #[serde(default = "default_gps_port")]
    pub port: String,

    #[serde(default = "default_gps_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_fix_timeout_ms")]
    pub fix_timeout_ms: u64,

    #[serde(default)]
    pub latitude: f64,

    #[serde(default)]
    pub longitude: f64,
}

/// Motion sensor configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SensorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Empty means auto-detect
    #[serde(default)]
    pub device_path: String,
}

/// Sampling loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_sampling_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub retry_on_denied: bool,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

/// Poll loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_polling_interval_secs")]
    pub interval_secs: u64,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Empty means console only
    #[serde(default)]
    pub log_dir: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,
}

// Default value functions
fn default_base_url() -> String { "http://localhost:3000".to_string() }
fn default_api_timeout_ms() -> u64 { 10000 }

fn default_credentials_path() -> String { "./credentials.json".to_string() }

fn default_position_source() -> PositionSourceKind { PositionSourceKind::Serial }
fn default_gps_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_gps_baud_rate() -> u32 { 9600 }
fn default_fix_timeout_ms() -> u64 { 30000 }

fn default_sampling_interval_secs() -> u64 { 60 }
fn default_retry_delay_secs() -> u64 { 30 }

fn default_polling_interval_secs() -> u64 { 20 }

fn default_log_file() -> String { "crashtrack.log".to_string() }

const VALID_GPS_BAUD_RATES: [u32; 6] = [4800, 9600, 19200, 38400, 57600, 115200];

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_api_timeout_ms(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            source: default_position_source(),
            port: default_gps_port(),
            baud_rate: default_gps_baud_rate(),
            fix_timeout_ms: default_fix_timeout_ms(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sampling_interval_secs(),
            retry_on_denied: false,
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_polling_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: String::new(),
            log_file: default_log_file(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PositionConfig {
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn invalid(message: impl std::fmt::Display) -> CrashtrackError {
    CrashtrackError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crashtrack::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate API configuration
        let base_url = self.api.base_url.as_str();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid("api base_url must start with http:// or https://"));
        }

        if self.api.timeout_ms == 0 || self.api.timeout_ms > 60000 {
            return Err(invalid("api timeout_ms must be between 1 and 60000"));
        }

        if self.credentials.path.is_empty() {
            return Err(invalid("credentials path cannot be empty"));
        }

        // Validate position source
        match self.position.source {
            PositionSourceKind::Serial => {
                if self.position.port.is_empty() {
                    return Err(invalid("position port cannot be empty for the serial source"));
                }

                if !VALID_GPS_BAUD_RATES.contains(&self.position.baud_rate) {
                    return Err(invalid(
                        "baud_rate must be one of: 4800, 9600, 19200, 38400, 57600, 115200",
                    ));
                }

                if self.position.fix_timeout_ms == 0 || self.position.fix_timeout_ms > 300000 {
                    return Err(invalid("fix_timeout_ms must be between 1 and 300000"));
                }
            }
            PositionSourceKind::Fixed => {
                if !(-90.0..=90.0).contains(&self.position.latitude) {
                    return Err(invalid("latitude must be between -90.0 and 90.0"));
                }

                if !(-180.0..=180.0).contains(&self.position.longitude) {
                    return Err(invalid("longitude must be between -180.0 and 180.0"));
                }
            }
        }

        // Sensor device_path can be empty (auto-detect)

        // Validate timing fields
        for (name, value) in [
            ("sampling interval_secs", self.sampling.interval_secs),
            ("polling interval_secs", self.polling.interval_secs),
        ] {
            if value == 0 || value > 3600 {
                return Err(invalid(format!("{} must be between 1 and 3600", name)));
            }
        }

        if self.sampling.retry_delay_secs == 0 {
            return Err(invalid("retry_delay_secs must be greater than 0"));
        }

        if !self.logging.log_dir.is_empty() && self.logging.log_file.is_empty() {
            return Err(invalid("log_file cannot be empty when log_dir is set"));
        }

        Ok(())
    }
}
