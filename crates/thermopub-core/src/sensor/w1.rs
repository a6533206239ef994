//! Linux one-wire sysfs bus.
//!
//! Each DS18B20 shows up as `<w1_dir>/28-xxxxxxxxxxxx/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::SensorError;

/// Source of raw temperature values.
pub trait SensorBus {
    /// List readable device identifiers, at most `cap` of them.
    fn enumerate(&self, cap: usize) -> Result<Vec<String>, SensorError>;

    /// Read one device, in °C.
    fn read_celsius(&self, device: &str) -> Result<f64, SensorError>;
}

/// Sysfs-backed one-wire bus.
#[derive(Debug, Clone)]
pub struct W1Bus {
    dir: PathBuf,
    family_prefix: String,
}

impl W1Bus {
    pub fn new(dir: impl Into<PathBuf>, family_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            family_prefix: family_prefix.into(),
        }
    }

    fn slave_path(&self, device: &str) -> PathBuf {
        self.dir.join(device).join("w1_slave")
    }
}

impl SensorBus for W1Bus {
    fn enumerate(&self, cap: usize) -> Result<Vec<String>, SensorError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| SensorError::BusUnreadable {
            dir: self.dir.clone(),
            source,
        })?;

        let mut devices: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(&self.family_prefix))
            .collect();
        // read_dir order is unspecified; keep sensor numbering stable across restarts
        devices.sort();
        devices.truncate(cap);

        if devices.is_empty() {
            return Err(SensorError::NoSensorsFound {
                dir: self.dir.clone(),
            });
        }

        debug!(dir = %self.dir.display(), count = devices.len(), "Enumerated one-wire devices");
        Ok(devices)
    }

    fn read_celsius(&self, device: &str) -> Result<f64, SensorError> {
        let content = fs::read_to_string(self.slave_path(device)).map_err(|source| {
            SensorError::Read {
                device: device.to_string(),
                source,
            }
        })?;
        parse_w1_slave(device, &content)
    }
}

/// Extract the temperature from a `w1_slave` file body.
pub fn parse_w1_slave(device: &str, content: &str) -> Result<f64, SensorError> {
    let crc_line = content.lines().next().unwrap_or_default().trim_end();
    if crc_line.ends_with("NO") {
        return Err(SensorError::Crc {
            device: device.to_string(),
        });
    }

    let token = content
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("t="))
        .ok_or_else(|| SensorError::Parse {
            device: device.to_string(),
            reason: "missing t= token".to_string(),
        })?;

    let millidegrees: i64 = token.parse().map_err(|e| SensorError::Parse {
        device: device.to_string(),
        reason: format!("bad value '{}': {}", token, e),
    })?;

    Ok(millidegrees as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                        72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    #[test]
    fn test_parse_valid() {
        let value = parse_w1_slave("28-01", GOOD).expect("valid reading");
        assert!((value - 23.125).abs() < 1e-9);
    }

    #[test]
    fn test_parse_negative() {
        let body = "ff ff : crc=aa YES\nff ff t=-10250\n";
        let value = parse_w1_slave("28-01", body).expect("valid reading");
        assert!((value + 10.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_crc_failure() {
        let body = "72 01 : crc=00 NO\n72 01 t=85000\n";
        assert!(matches!(
            parse_w1_slave("28-01", body),
            Err(SensorError::Crc { .. })
        ));
    }

    #[test]
    fn test_parse_missing_token() {
        assert!(matches!(
            parse_w1_slave("28-01", "72 01 : crc=57 YES\n"),
            Err(SensorError::Parse { .. })
        ));
        assert!(matches!(
            parse_w1_slave("28-01", "YES\nt=abc\n"),
            Err(SensorError::Parse { .. })
        ));
    }

    #[test]
    fn test_enumerate_filters_sorts_and_caps() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["28-0000000c", "28-0000000a", "w1_bus_master1", "10-00000001", "28-0000000b"] {
            fs::create_dir(dir.path().join(name)).expect("mkdir");
        }

        let bus = W1Bus::new(dir.path(), "28-");
        let all = bus.enumerate(6).expect("devices");
        assert_eq!(all, vec!["28-0000000a", "28-0000000b", "28-0000000c"]);

        let capped = bus.enumerate(2).expect("devices");
        assert_eq!(capped, vec!["28-0000000a", "28-0000000b"]);
    }

    #[test]
    fn test_enumerate_empty_and_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("w1_bus_master1")).expect("mkdir");

        let bus = W1Bus::new(dir.path(), "28-");
        assert!(matches!(
            bus.enumerate(6),
            Err(SensorError::NoSensorsFound { .. })
        ));

        let missing = W1Bus::new(dir.path().join("absent"), "28-");
        assert!(matches!(
            missing.enumerate(6),
            Err(SensorError::BusUnreadable { .. })
        ));
    }

    #[test]
    fn test_read_missing_device() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = W1Bus::new(dir.path(), "28-");
        assert!(matches!(
            bus.read_celsius("28-gone"),
            Err(SensorError::Read { .. })
        ));
    }
}
