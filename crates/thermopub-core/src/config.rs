//! Publisher configuration.
//!
//! Loaded once at startup from an optional TOML file, then adjusted by
//! command-line overrides. Every field has a default so an empty file is valid.
//!
//! ```toml
//! [broker]
//! host = "weather.ednet.pri"
//! port = 1883
//!
//! [publish]
//! topic = "bbox/loop"
//! interval_secs = 5
//!
//! [sensors]
//! w1_dir = "/sys/bus/w1/devices"
//! max_sensors = 6
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: Option<String>,

    #[serde(default = "default_password", skip_serializing)]
    pub password: Option<String>,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// MQTT keep-alive in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

/// What gets published and how often
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Seconds to wait after a completed cycle before starting the next
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_qos")]
    pub qos: u8,

    #[serde(default = "default_retain")]
    pub retain: bool,

    /// Prepend a `dateTime` key with the Unix time
    #[serde(default)]
    pub timestamp: bool,
}

/// One-wire bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_w1_dir")]
    pub w1_dir: PathBuf,

    /// Directory name prefix of supported devices (DS18B20 family code)
    #[serde(default = "default_family_prefix")]
    pub family_prefix: String,

    #[serde(default = "default_max_sensors")]
    pub max_sensors: usize,

    /// Largest accepted change between consecutive readings, in °C
    #[serde(default = "default_max_temp_change")]
    pub max_temp_change: f64,
}

/// Control loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// How long a connect, publish or disconnect may stay pending
    #[serde(default = "default_watchdog")]
    pub watchdog_secs: u64,

    /// Upper bound on each transport event wait
    #[serde(default = "default_poll_block")]
    pub poll_block_ms: u64,
}

/// Complete publisher configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

fn default_host() -> String {
    "weather.ednet.pri".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_username() -> Option<String> {
    Some("bbox".to_string())
}

fn default_password() -> Option<String> {
    Some("bluetit".to_string())
}

fn default_client_id() -> String {
    "bbox".to_string()
}

fn default_keep_alive() -> u64 {
    10
}

fn default_topic() -> String {
    "bbox/loop".to_string()
}

fn default_interval() -> u64 {
    5
}

fn default_qos() -> u8 {
    2
}

fn default_retain() -> bool {
    true
}

fn default_w1_dir() -> PathBuf {
    PathBuf::from("/sys/bus/w1/devices")
}

fn default_family_prefix() -> String {
    "28-".to_string()
}

fn default_max_sensors() -> usize {
    6
}

fn default_max_temp_change() -> f64 {
    5.0
}

fn default_watchdog() -> u64 {
    20
}

fn default_poll_block() -> u64 {
    1000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: default_password(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            interval_secs: default_interval(),
            qos: default_qos(),
            retain: default_retain(),
            timestamp: false,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            w1_dir: default_w1_dir(),
            family_prefix: default_family_prefix(),
            max_sensors: default_max_sensors(),
            max_temp_change: default_max_temp_change(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watchdog_secs: default_watchdog(),
            poll_block_ms: default_poll_block(),
        }
    }
}

impl PublisherConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker host is empty".into()));
        }
        if self.publish.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("topic is empty".into()));
        }
        if self.publish.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "publish interval must be at least one second".into(),
            ));
        }
        if self.publish.qos > 2 {
            return Err(ConfigError::Invalid(format!(
                "qos must be 0, 1 or 2 (got {})",
                self.publish.qos
            )));
        }
        if self.sensors.max_sensors == 0 {
            return Err(ConfigError::Invalid("max_sensors must be at least 1".into()));
        }
        let max_change = self.sensors.max_temp_change;
        if max_change.is_nan() || max_change <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_temp_change must be a positive number".into(),
            ));
        }
        if self.daemon.watchdog_secs == 0 {
            return Err(ConfigError::Invalid("watchdog must be at least one second".into()));
        }
        if self.daemon.poll_block_ms == 0 {
            return Err(ConfigError::Invalid("poll block must be non-zero".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.publish.interval_secs)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.daemon.watchdog_secs)
    }

    pub fn poll_block(&self) -> Duration {
        Duration::from_millis(self.daemon.poll_block_ms)
    }
}
