//! Broker transport abstraction.
//!
//! Operations only *start* work; completion is reported later as a
//! [`TransportEvent`] returned from [`Transport::iterate`]. The daemon feeds
//! those events to the state machine.

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::BrokerConfig;
use crate::error::TransportError;

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(TransportError::Client(format!("invalid qos {}", other))),
        }
    }
}

/// Completion of a previously started transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connect finished; `Err` when the broker refused or the network failed
    Connected(Result<(), TransportError>),
    /// The last publish was acknowledged at its QoS level
    Published,
    /// The session is closed; `Err` when it was not closed on request
    Disconnected(Result<(), TransportError>),
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::Connected(Ok(())) => write!(f, "connected"),
            TransportEvent::Connected(Err(e)) => write!(f, "connect failed ({})", e),
            TransportEvent::Published => write!(f, "published"),
            TransportEvent::Disconnected(Ok(())) => write!(f, "disconnected"),
            TransportEvent::Disconnected(Err(e)) => write!(f, "connection lost ({})", e),
        }
    }
}

/// Asynchronous broker client driven by the daemon's control loop.
#[async_trait]
pub trait Transport: Send {
    /// Begin connecting to the broker.
    async fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError>;

    /// Queue a message on the open session.
    async fn publish(
        &mut self,
        topic: &str,
        payload: String,
        qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError>;

    /// Begin closing the session.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Wait at most `block` for completions and return those that arrived.
    async fn iterate(&mut self, block: Duration) -> Vec<TransportEvent>;
}
