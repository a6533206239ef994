//! Control loop tying the state machine to the sensors and the transport.
//!
//! Everything runs on one task: each turn polls the state machine, executes
//! the command it returns, then waits (bounded) for transport completions
//! and feeds them back.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::error::Result;
use crate::machine::{Command, ConnectionState, CycleStats, PublishMachine};
use crate::payload::Payload;
use crate::sensor::{ReadingStatus, SensorBus, SensorReader, W1Bus};
use crate::transport::{Qos, Transport};

/// Sensor-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorStats {
    pub rejected_outliers: u64,
    pub read_failures: u64,
}

/// Owned daemon context.
pub struct Daemon<T, B> {
    config: PublisherConfig,
    qos: Qos,
    machine: PublishMachine,
    reader: SensorReader<B>,
    transport: T,
    sensor_stats: SensorStats,
    last_payload: Option<String>,
}

impl<T: Transport> Daemon<T, W1Bus> {
    /// Open the one-wire bus described by `config`.
    ///
    /// Fails when no sensor can be found; the state machine is never started
    /// in that case.
    pub fn from_config(config: PublisherConfig, transport: T) -> Result<Self> {
        let bus = W1Bus::new(&config.sensors.w1_dir, &config.sensors.family_prefix);
        Self::new(config, bus, transport)
    }
}

impl<T: Transport, B: SensorBus> Daemon<T, B> {
    pub fn new(config: PublisherConfig, bus: B, transport: T) -> Result<Self> {
        config.validate()?;
        let qos = Qos::try_from(config.publish.qos)?;
        let reader = SensorReader::open(
            bus,
            config.sensors.max_sensors,
            config.sensors.max_temp_change,
        )?;
        info!(count = reader.len(), devices = ?reader.devices(), "Found temperature sensors");

        let machine = PublishMachine::new(config.watchdog(), config.interval());
        Ok(Self {
            config,
            qos,
            machine,
            reader,
            transport,
            sensor_stats: SensorStats::default(),
            last_payload: None,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn cycle_stats(&self) -> CycleStats {
        self.machine.stats()
    }

    pub fn sensor_stats(&self) -> SensorStats {
        self.sensor_stats
    }

    pub fn sensor_count(&self) -> usize {
        self.reader.len()
    }

    /// Body of the most recent publish attempt.
    pub fn last_payload(&self) -> Option<&str> {
        self.last_payload.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run forever.
    pub async fn run(&mut self) {
        info!(
            broker = %self.config.broker.host,
            port = self.config.broker.port,
            topic = %self.config.publish.topic,
            interval_secs = self.config.publish.interval_secs,
            "Publisher started"
        );
        loop {
            self.turn().await;
        }
    }

    /// Run until one more cycle has completed.
    pub async fn run_cycle(&mut self) {
        let target = self.machine.stats().completed + 1;
        while self.machine.stats().completed < target {
            self.turn().await;
        }
    }

    /// One control loop iteration.
    pub async fn turn(&mut self) {
        if let Some(command) = self.machine.poll(Instant::now()) {
            self.execute(command).await;
        }

        let events = self.transport.iterate(self.config.poll_block()).await;
        for event in events {
            let completed = self.machine.stats().completed;
            if let Some(command) = self.machine.on_event(&event, Instant::now()) {
                self.execute(command).await;
            }
            if self.machine.stats().completed > completed {
                self.log_cycle();
            }
        }
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if let Err(e) = self.transport.connect(&self.config.broker).await {
                    // the watchdog retries
                    warn!(error = %e, "Connect could not be started");
                }
            }
            Command::Publish => {
                let payload = self.sample();
                info!(payload = %payload, "Sending data");
                let result = self
                    .transport
                    .publish(
                        &self.config.publish.topic,
                        payload,
                        self.qos,
                        self.config.publish.retain,
                    )
                    .await;
                if let Err(e) = result {
                    warn!(error = %e, "Error publishing");
                    if let Some(Command::Disconnect) = self.machine.publish_failed() {
                        self.disconnect().await;
                    }
                }
            }
            Command::Disconnect => self.disconnect().await,
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "Disconnect request failed");
        }
    }

    fn sample(&mut self) -> String {
        let readings = self.reader.read_all();
        for reading in &readings {
            match reading.status {
                ReadingStatus::Fresh => {}
                ReadingStatus::Filtered => self.sensor_stats.rejected_outliers += 1,
                ReadingStatus::Stale => self.sensor_stats.read_failures += 1,
            }
        }
        let missing = self.reader.len() - readings.len();
        self.sensor_stats.read_failures += missing as u64;

        let timestamp = self
            .config
            .publish
            .timestamp
            .then(|| chrono::Utc::now().timestamp());
        let json = Payload::new(&readings, timestamp).to_json();
        self.last_payload = Some(json.clone());
        json
    }

    fn log_cycle(&self) {
        let cycles = self.machine.stats();
        info!(
            completed = cycles.completed,
            watchdog_resets = cycles.watchdog_resets,
            failures = cycles.failures,
            rejected_outliers = self.sensor_stats.rejected_outliers,
            read_failures = self.sensor_stats.read_failures,
            "Publish cycle complete"
        );
    }
}
