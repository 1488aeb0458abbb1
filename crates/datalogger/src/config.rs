//! Logger configuration
//!
//! Loaded once at startup from an optional TOML file and `DATALOGGER_*`
//! environment variables. The recovery constants (boot attempts, retry
//! interval, error threshold, flush threshold) are not configurable.

use config::{Config, Environment, File};
use obd_protocol::{ObdProtocol, Pid, DEFAULT_TIMEOUT_MS};
use obd_scheduler::{CapabilityProber, SchedulerError, TierTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::LogFormat;
use thiserror::Error;
use tracing::Level;

/// Device name selecting the simulated link
pub const MOCK_DEVICE: &str = "mock";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid tier table: {0}")]
    Tiers(#[from] SchedulerError),
    #[error("Invalid log level: {0}")]
    LogLevel(String),
}

/// Data logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Serial device of the ELM327 adapter, or `mock`
    pub device: String,
    pub baud_rate: u32,
    pub protocol: ObdProtocol,
    /// Adapter response timeout (milliseconds)
    pub response_timeout_ms: u64,
    /// Mount point of the log medium
    pub storage_root: PathBuf,
    pub log_format: LogFormat,
    /// Interval between storage probes while storage is unavailable (milliseconds)
    pub storage_reprobe_ms: u64,
    /// Minimum tick period (milliseconds); 0 runs ticks back to back
    pub tick_interval_ms: u64,
    pub tiers: TierTable,
    /// PIDs listed by the capability probe at each connection
    pub capability_pids: Vec<Pid>,
    pub log_level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
            protocol: ObdProtocol::Auto,
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            storage_root: PathBuf::from("/media/sdcard"),
            log_format: LogFormat::Csv,
            storage_reprobe_ms: 10_000,
            tick_interval_ms: 0,
            tiers: TierTable::default(),
            capability_pids: CapabilityProber::default_pids(),
            log_level: "info".to_string(),
        }
    }
}

impl LoggerConfig {
    /// Environment variable naming the config file
    pub const PATH_ENV: &'static str = "DATALOGGER_CONFIG";
    /// Config file used when `DATALOGGER_CONFIG` is unset
    pub const DEFAULT_PATH: &'static str = "datalogger.toml";

    /// Load from the file named by `DATALOGGER_CONFIG` (or `datalogger.toml`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(Self::PATH_ENV).unwrap_or_else(|_| Self::DEFAULT_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from `path` (optional) and the environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("DATALOGGER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tiers.validate()?;
        self.level()?;
        Ok(())
    }

    /// Maximum log level
    pub fn level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse::<Level>()
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    /// Whether the simulated link was selected
    pub fn is_mock(&self) -> bool {
        self.device == MOCK_DEVICE
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn storage_reprobe(&self) -> Duration {
        Duration::from_millis(self.storage_reprobe_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
