//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ControllerConfig: Where the rig's HTTP API lives and how long to wait on it.
//!     - CameraConfig: Stream URL and the frame-load timeout used as a health check.
//!     - PollingConfig: Liveness and data poll cadences.
//!     - Thresholds: Fallback limits shown before the first successful fetch.
//!     - AlertPreferences: Per-category alert toggles.
//!     - ServerConfig / LoggingConfig: The view API and log output.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::domain::Thresholds;
use crate::evaluator::AlertPreferences;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub controller: ControllerConfig,
    pub camera: CameraConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub alerts: AlertPreferences,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    /// e.g. "http://192.168.202.52"
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// e.g. "http://192.168.202.120:81/stream"
    pub stream_url: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_seconds: u64,
    #[serde(default = "default_data_interval")]
    pub data_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub show_sensor_data: bool,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_liveness_interval() -> u64 {
    10
}

fn default_data_interval() -> u64 {
    3
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            liveness_interval_seconds: default_liveness_interval(),
            data_interval_seconds: default_data_interval(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl PollingConfig {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_seconds)
    }

    pub fn data_interval(&self) -> Duration {
        Duration::from_secs(self.data_interval_seconds)
    }
}

impl CameraConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

impl ControllerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DashboardConfig = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.polling.liveness_interval_seconds > 0, "polling.liveness_interval_seconds must be positive");
        anyhow::ensure!(self.polling.data_interval_seconds > 0, "polling.data_interval_seconds must be positive");
        anyhow::ensure!(self.camera.probe_timeout_seconds > 0, "camera.probe_timeout_seconds must be positive");
        Ok(())
    }

    /// Load with default fallback
    ///
    /// an explicit path must load; the well-known locations are only tried.
    pub fn load_or_default(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            let config = Self::load(&path)?;
            println!("[CONFIG] Loaded from {}", path.display());
            return Ok(config);
        }

        let paths = [
            PathBuf::from("config").join("dashboard.toml"),
            PathBuf::from("..").join("config").join("dashboard.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Ok(Self::default())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          DASHBOARD CONFIGURATION        │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Controller: {}", self.controller.base_url);
        println!("│ Camera: {}", self.camera.stream_url);
        println!("│ Liveness Poll: {}s", self.polling.liveness_interval_seconds);
        println!("│ Data Poll: {}s", self.polling.data_interval_seconds);
        println!("│ Fallback Limits: {}°C / {}%", self.thresholds.temp, self.thresholds.moist);
        println!("│ View API: {}", self.server.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig {
                base_url: "http://192.168.202.52".to_string(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            camera: CameraConfig {
                stream_url: "http://192.168.202.120:81/stream".to_string(),
                probe_timeout_seconds: default_probe_timeout(),
            },
            polling: PollingConfig::default(),
            thresholds: Thresholds::default(),
            alerts: AlertPreferences::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
