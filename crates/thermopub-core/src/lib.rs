//! One-wire temperature publisher.
//!
//! Periodically reads DS18B20 sensors from the Linux one-wire bus and publishes
//! the readings as one JSON message to an MQTT broker, connecting only for the
//! duration of each publish.
//!
//! ## Architecture
//!
//! - **Timers**: publish schedule and watchdog countdowns
//! - **SensorReader**: device enumeration plus the outlier filter
//! - **Payload**: JSON body for one cycle
//! - **PublishMachine**: connect → publish → disconnect → wait state machine
//! - **Transport**: asynchronous broker client (`rumqttc` with the `mqtt` feature)
//! - **Daemon**: the single-task control loop owning all of the above
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `mqtt` | ✅ | `rumqttc`-backed transport |

pub mod config;
pub mod daemon;
pub mod error;
pub mod machine;
pub mod payload;
pub mod sensor;
pub mod timer;
pub mod transport;

pub use config::{BrokerConfig, DaemonConfig, PublishConfig, PublisherConfig, SensorConfig};
pub use daemon::{Daemon, SensorStats};
pub use error::{ConfigError, Error, Result, SensorError, TransportError};
pub use machine::{Command, ConnectionState, CycleStats, PublishMachine};
pub use payload::Payload;
pub use sensor::{Reading, ReadingStatus, SensorBus, SensorReader, W1Bus};
pub use timer::{TimerId, Timers};
pub use transport::{Qos, Transport, TransportEvent};

#[cfg(feature = "mqtt")]
pub use transport::MqttTransport;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
