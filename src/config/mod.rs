//! Configuration module for the CL-3000 monitor
//!
//! Persistent configuration lives in a single TOML file in the platform
//! config directory:
//!
//! - **Linux**: `~/.config/dev.hxyulin.cl3000-monitor/monitor.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.cl3000-monitor/monitor.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.cl3000-monitor\monitor.toml`
//!
//! The configuration is split by concern: [`DeviceConfig`] identifies the
//! device on the network, [`AcquisitionConfig`] controls the polling loop,
//! and [`GraphConfig`] controls the refresh cadence and default view. The
//! device section is passed into the backend as an immutable value at
//! construction time; nothing reads connection parameters from global state.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application identifier for the config directory
pub const APP_ID: &str = "dev.hxyulin.cl3000-monitor";

/// Configuration filename
pub const CONFIG_FILE: &str = "monitor.toml";

/// Default poll interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 0.5;

/// Default rolling-window capacity in samples per channel
pub const DEFAULT_SERIES_CAPACITY: usize = 1000;

/// Default graph refresh interval in milliseconds
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 500;

/// Device open timeout for live polling, in milliseconds
pub const LIVE_CONNECT_TIMEOUT_MS: u32 = 5_000;

/// Device open timeout for a storage (logging) session, in milliseconds
pub const STORAGE_CONNECT_TIMEOUT_MS: u32 = 10_000;

/// Consecutive connect failures before the poller gives up entirely
pub const MAX_CONNECT_FAILURES: u32 = 5;

/// Consecutive read failures before the poller forces a reconnect
pub const MAX_READ_FAILURES: u32 = 5;

/// Default wait between connect retries, replacing the normal poll sleep
pub const DEFAULT_CONNECT_BACKOFF_SECS: f64 = 2.0;

/// Bounded wait for the worker thread to exit on stop
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Zero-reset group number on the device
pub const ZERO_RESET_GROUP: u16 = 1;

/// Network identity and timeouts of the measurement device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// SDK device slot (the vendor library supports several open devices)
    pub device_id: i32,
    /// IPv4 address of the device head unit
    pub ip_address: [u8; 4],
    /// TCP port of the communication interface
    pub port: u16,
    /// Open timeout in milliseconds
    pub connect_timeout_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            ip_address: [192, 168, 1, 7],
            port: 24685,
            connect_timeout_ms: LIVE_CONNECT_TIMEOUT_MS,
        }
    }
}

impl DeviceConfig {
    /// Render the address as `a.b.c.d:port` for logs and the UI.
    pub fn address_string(&self) -> String {
        let [a, b, c, d] = self.ip_address;
        format!("{}.{}.{}.{}:{}", a, b, c, d, self.port)
    }
}

/// Polling-loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Number of OUT channels to decode and display (1-8)
    pub channel_count: u8,
    /// Seconds between measurement polls
    pub poll_interval_secs: f64,
    /// Rolling-window capacity in samples per channel
    pub series_capacity: usize,
    /// Seconds to wait between connect retries
    pub connect_backoff_secs: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            channel_count: 6,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            connect_backoff_secs: DEFAULT_CONNECT_BACKOFF_SECS,
        }
    }
}

impl AcquisitionConfig {
    /// Poll interval as a `Duration`, clamped to a sane minimum.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs.max(0.01))
    }

    /// Connect-retry backoff as a `Duration`.
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.connect_backoff_secs.max(0.01))
    }

    /// Channel count clamped to the device's 1-8 range.
    pub fn clamped_channel_count(&self) -> u8 {
        self.channel_count.clamp(1, crate::types::MAX_CHANNELS as u8)
    }
}

/// Graph refresh cadence and default view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Milliseconds between view recomputations
    pub refresh_interval_ms: u64,
    /// X range shown when no valid data exists yet (seconds)
    pub default_x_range: (f64, f64),
    /// Y range shown when no valid data exists yet (micrometres)
    pub default_y_range: (f64, f64),
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            default_x_range: (0.0, 10.0),
            default_y_range: (0.0, 100.0),
        }
    }
}

impl GraphConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(50))
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// Get the application config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path of the config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

impl AppConfig {
    /// Load the config file, falling back to defaults when it is missing
    /// or unreadable. A corrupt file is logged and ignored rather than
    /// aborting startup.
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    tracing::warn!("Failed to load config from {:?}: {}", path, e);
                }
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| MonitorError::Serialization(e.to_string()))
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| MonitorError::Serialization(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Save to the default location, if one can be determined.
    pub fn save_default(&self) -> Result<()> {
        let path = config_path()
            .ok_or_else(|| MonitorError::Config("no config directory available".to_string()))?;
        self.save(path)
    }
}
