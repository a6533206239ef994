//! Daemon behaviour against a broker port nobody listens on
//!
//! Uses the real `rumqttc` transport; the connect fails at the TCP level.

#![cfg(feature = "mqtt")]

use std::fs;
use std::time::{Duration, Instant};

use thermopub_core::{ConnectionState, Daemon, MqttTransport, PublisherConfig};

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_unreachable_broker_retries_at_watchdog_pace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let device = dir.path().join("28-000000000001");
    fs::create_dir_all(&device).expect("create device dir");
    fs::write(
        device.join("w1_slave"),
        "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=20000\n",
    )
    .expect("write w1_slave");

    let mut config = PublisherConfig::default();
    config.sensors.w1_dir = dir.path().to_path_buf();
    config.broker.host = "127.0.0.1".to_string();
    config.broker.port = closed_port();
    config.publish.interval_secs = 1;
    config.daemon.watchdog_secs = 1;
    config.daemon.poll_block_ms = 5;

    let mut daemon = Daemon::from_config(config, MqttTransport::new()).expect("daemon starts");

    let watchdog = Duration::from_secs(1);
    let started = Instant::now();
    let mut turns: u64 = 0;
    while started.elapsed() < Duration::from_millis(2500) {
        daemon.turn().await;
        turns += 1;
    }
    let elapsed = started.elapsed();

    // each connect attempt ends in a watchdog reset, never an immediate retry
    let stats = daemon.cycle_stats();
    let bound = (elapsed.as_millis() / watchdog.as_millis()) as u64 + 1;
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.completed, 0);
    assert!(stats.watchdog_resets >= 1);
    assert!(
        stats.watchdog_resets <= bound,
        "{} resets in {:?}",
        stats.watchdog_resets,
        elapsed
    );
    assert_ne!(daemon.state(), ConnectionState::Publishing);

    // turns block for the poll interval instead of returning at once
    assert!(turns < 1000, "{} turns in {:?}", turns, elapsed);
    assert!(daemon.last_payload().is_none());
}
