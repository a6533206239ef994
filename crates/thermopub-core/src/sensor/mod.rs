//! Temperature sensor reading.
//!
//! Devices are enumerated once when the reader is opened and never change
//! afterwards. Each call to [`SensorReader::read_all`] reads every device and
//! runs the result through the outlier [`filter`].

pub mod filter;
pub mod w1;

pub use filter::{sanitize, Filtered};
pub use w1::{parse_w1_slave, SensorBus, W1Bus};

use tracing::{info, warn};

use crate::error::SensorError;

/// How a published value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingStatus {
    /// Read this cycle and accepted
    Fresh,
    /// Read this cycle but rejected as an outlier; previous value reused
    Filtered,
    /// Read failed this cycle; previous value reused
    Stale,
}

/// One sanitized temperature for one sensor in one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Zero-based index into the enumerated device list
    pub sensor: usize,
    pub celsius: f64,
    pub status: ReadingStatus,
}

/// Reads all enumerated sensors and keeps the last accepted value of each.
pub struct SensorReader<B> {
    bus: B,
    devices: Vec<String>,
    last: Vec<Option<f64>>,
    max_change: f64,
}

impl<B: SensorBus> SensorReader<B> {
    /// Enumerate the bus. Fails when no device can be found.
    pub fn open(bus: B, cap: usize, max_change: f64) -> Result<Self, SensorError> {
        let devices = bus.enumerate(cap)?;
        let last = vec![None; devices.len()];
        Ok(Self {
            bus,
            devices,
            last,
            max_change,
        })
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Last accepted value per sensor, `None` until the first good read.
    pub fn last_accepted(&self) -> &[Option<f64>] {
        &self.last
    }

    /// Read every sensor once.
    ///
    /// A sensor whose read fails reuses its previous value; if it has never
    /// produced a value it is left out of the result.
    pub fn read_all(&mut self) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(self.devices.len());

        for (sensor, device) in self.devices.iter().enumerate() {
            let previous = self.last[sensor];

            let raw = match self.bus.read_celsius(device) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(device = %device, error = %e, "Sensor read failed");
                    if let Some(celsius) = previous {
                        readings.push(Reading {
                            sensor,
                            celsius,
                            status: ReadingStatus::Stale,
                        });
                    }
                    continue;
                }
            };

            let reading = match sanitize(previous, raw, self.max_change) {
                Filtered::Accepted(celsius) => {
                    self.last[sensor] = Some(celsius);
                    Reading {
                        sensor,
                        celsius,
                        status: ReadingStatus::Fresh,
                    }
                }
                Filtered::Rejected { raw, kept } => {
                    info!(device = %device, raw, kept, "Ignored implausible temperature");
                    Reading {
                        sensor,
                        celsius: kept,
                        status: ReadingStatus::Filtered,
                    }
                }
            };
            readings.push(reading);
        }

        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Bus returning scripted values per device, one per read.
    struct ScriptedBus {
        devices: Vec<String>,
        values: RefCell<Vec<VecDeque<Option<f64>>>>,
    }

    impl ScriptedBus {
        fn new(script: Vec<Vec<Option<f64>>>) -> Self {
            Self {
                devices: (0..script.len()).map(|i| format!("28-{:04}", i)).collect(),
                values: RefCell::new(script.into_iter().map(VecDeque::from).collect()),
            }
        }
    }

    impl SensorBus for ScriptedBus {
        fn enumerate(&self, cap: usize) -> Result<Vec<String>, SensorError> {
            let devices: Vec<String> = self.devices.iter().take(cap).cloned().collect();
            if devices.is_empty() {
                return Err(SensorError::NoSensorsFound {
                    dir: "scripted".into(),
                });
            }
            Ok(devices)
        }

        fn read_celsius(&self, device: &str) -> Result<f64, SensorError> {
            let idx = self
                .devices
                .iter()
                .position(|d| d == device)
                .expect("known device");
            match self.values.borrow_mut()[idx].pop_front().flatten() {
                Some(v) => Ok(v),
                None => Err(SensorError::Parse {
                    device: device.to_string(),
                    reason: "scripted failure".to_string(),
                }),
            }
        }
    }

    fn values(readings: &[Reading]) -> Vec<f64> {
        readings.iter().map(|r| r.celsius).collect()
    }

    #[test]
    fn test_outlier_scenario() {
        let bus = ScriptedBus::new(vec![
            vec![Some(20.0), Some(21.0)],
            vec![Some(20.0), Some(30.0)],
        ]);
        let mut reader = SensorReader::open(bus, 6, 5.0).expect("open");

        assert_eq!(values(&reader.read_all()), vec![20.0, 20.0]);

        let second = reader.read_all();
        assert_eq!(values(&second), vec![21.0, 20.0]);
        assert_eq!(second[0].status, ReadingStatus::Fresh);
        assert_eq!(second[1].status, ReadingStatus::Filtered);
        assert_eq!(reader.last_accepted(), &[Some(21.0), Some(20.0)]);
    }

    #[test]
    fn test_rejected_value_does_not_move_reference() {
        let bus = ScriptedBus::new(vec![vec![Some(20.0), Some(40.0), Some(24.0), Some(40.0)]]);
        let mut reader = SensorReader::open(bus, 6, 5.0).expect("open");

        assert_eq!(values(&reader.read_all()), vec![20.0]);
        assert_eq!(values(&reader.read_all()), vec![20.0]);
        assert_eq!(values(&reader.read_all()), vec![24.0]);
        assert_eq!(values(&reader.read_all()), vec![24.0]);
    }

    #[test]
    fn test_read_failure_reuses_previous() {
        let bus = ScriptedBus::new(vec![vec![Some(18.5), None, Some(19.0)]]);
        let mut reader = SensorReader::open(bus, 6, 5.0).expect("open");

        reader.read_all();
        let stale = reader.read_all();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].celsius, 18.5);
        assert_eq!(stale[0].status, ReadingStatus::Stale);

        assert_eq!(values(&reader.read_all()), vec![19.0]);
    }

    #[test]
    fn test_failure_before_first_value_is_omitted() {
        let bus = ScriptedBus::new(vec![vec![None], vec![Some(22.0)]]);
        let mut reader = SensorReader::open(bus, 6, 5.0).expect("open");

        let readings = reader.read_all();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor, 1);
        assert_eq!(reader.last_accepted(), &[None, Some(22.0)]);
    }

    #[test]
    fn test_open_respects_cap() {
        let bus = ScriptedBus::new(vec![vec![], vec![], vec![]]);
        let reader = SensorReader::open(bus, 2, 5.0).expect("open");
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.last_accepted(), &[None, None]);
    }
}
