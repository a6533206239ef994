//! Command-line entry point for the one-wire temperature publisher.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use thermopub_core::{Daemon, MqttTransport, PublisherConfig};
use tracing::{error, info};

/// MQTT temperature publisher.
#[derive(Parser, Debug)]
#[command(name = "thermopub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Loop interval in seconds.
    #[arg(short = 'l', long)]
    interval: Option<u64>,

    /// Broker username.
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Broker password.
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Broker hostname.
    #[arg(short = 'a', long)]
    host: Option<String>,

    /// Publishing topic.
    #[arg(short = 't', long)]
    topic: Option<String>,

    /// Broker port.
    #[arg(short = 'x', long)]
    port: Option<u16>,

    /// One-wire device directory.
    #[arg(long)]
    w1_dir: Option<PathBuf>,

    /// Prepend a dateTime key to every message.
    #[arg(long)]
    timestamp: bool,

    /// Publish a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<PublisherConfig> {
        let mut config = match &self.config {
            Some(path) => PublisherConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => PublisherConfig::default(),
        };

        if let Some(interval) = self.interval {
            config.publish.interval_secs = interval;
        }
        if let Some(username) = self.username {
            config.broker.username = Some(username);
        }
        if let Some(password) = self.password {
            config.broker.password = Some(password);
        }
        if let Some(host) = self.host {
            config.broker.host = host;
        }
        if let Some(topic) = self.topic {
            config.publish.topic = topic;
        }
        if let Some(port) = self.port {
            config.broker.port = port;
        }
        if let Some(dir) = self.w1_dir {
            config.sensors.w1_dir = dir;
        }
        if self.timestamp {
            config.publish.timestamp = true;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "thermopub={level},thermopub_core={level},warn",
            level = default_level
        ))
    });

    // JSON output for log collectors
    let json_logging = std::env::var("THERMOPUB_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let once = args.once;
    let config = args.into_config()?;

    info!("mqtt temperature publisher");
    info!(
        broker = %config.broker.host,
        port = config.broker.port,
        user = config.broker.username.as_deref().unwrap_or("-"),
        topic = %config.publish.topic,
        interval_secs = config.publish.interval_secs,
        w1_dir = %config.sensors.w1_dir.display(),
        "Configuration"
    );

    let mut daemon = Daemon::from_config(config, MqttTransport::new()).map_err(|e| {
        error!(error = %e, "Couldn't start publisher");
        e
    })?;

    if once {
        daemon.run_cycle().await;
        return Ok(());
    }

    daemon.run().await;
    Ok(())
}
