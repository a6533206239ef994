//! Error types for the publisher.
//!
//! Only [`SensorError::NoSensorsFound`] and [`SensorError::BusUnreadable`] stop
//! the process; everything else is logged and recovered from by the state
//! machine.

use std::path::PathBuf;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sensor bus error
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// Broker transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while discovering or reading one-wire sensors.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// The bus directory exists but holds no matching device
    #[error("No temperature sensors found in {}", .dir.display())]
    NoSensorsFound { dir: PathBuf },

    /// The bus directory could not be listed
    #[error("Sensor bus {} unreadable: {source}", .dir.display())]
    BusUnreadable {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single device could not be read
    #[error("Failed to read sensor {device}: {source}")]
    Read {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// The device file did not contain a usable `t=` token
    #[error("Malformed reading from sensor {device}: {reason}")]
    Parse { device: String, reason: String },

    /// The device reported a CRC failure for the conversion
    #[error("CRC check failed on sensor {device}")]
    Crc { device: String },
}

impl SensorError {
    /// Whether this error prevents the daemon from starting at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SensorError::NoSensorsFound { .. } | SensorError::BusUnreadable { .. }
        )
    }
}

/// Errors reported by the broker transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Operation requires an open session
    #[error("Not connected")]
    NotConnected,

    /// Broker rejected the connection
    #[error("Connection refused: {0}")]
    Refused(String),

    /// Network level failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Client request could not be queued
    #[error("Client error: {0}")]
    Client(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let fatal = SensorError::NoSensorsFound {
            dir: PathBuf::from("/sys/bus/w1/devices"),
        };
        assert!(fatal.is_fatal());

        let transient = SensorError::Crc {
            device: "28-0000".to_string(),
        };
        assert!(!transient.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err: Error = SensorError::NoSensorsFound {
            dir: PathBuf::from("/tmp/w1"),
        }
        .into();
        assert!(err.to_string().contains("No temperature sensors found"));

        let err: Error = TransportError::Refused("bad credentials".to_string()).into();
        assert_eq!(err.to_string(), "Connection refused: bad credentials");
    }
}
