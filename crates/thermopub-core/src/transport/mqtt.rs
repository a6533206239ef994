//! MQTT transport over `rumqttc`.
//!
//! Each connect creates a fresh client/event loop pair. A pump task polls the
//! event loop and forwards the packets the state machine cares about through
//! a channel; [`MqttTransport::iterate`] drains that channel with a bounded
//! wait and turns the packets into [`TransportEvent`]s.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{Qos, Transport, TransportEvent};
use crate::config::BrokerConfig;
use crate::error::TransportError;

/// Capacity of the rumqttc request channel.
const REQUEST_CAPACITY: usize = 10;

/// Event loop activity relevant to a publish cycle.
#[derive(Debug, Clone, PartialEq)]
enum Signal {
    ConnAck(ConnectReturnCode),
    /// A PUBLISH packet went out
    Sent,
    /// PUBACK received
    Acked,
    /// PUBCOMP received
    Completed,
    /// DISCONNECT packet went out
    Closed,
    Failed(String),
}

impl Signal {
    fn is_terminal(&self) -> bool {
        match self {
            Signal::Closed | Signal::Failed(_) => true,
            Signal::ConnAck(code) => *code != ConnectReturnCode::Success,
            _ => false,
        }
    }
}

/// Per-session bookkeeping used to interpret signals.
#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    pending: Option<Qos>,
}

impl SessionState {
    fn translate(&mut self, signal: Signal) -> Option<TransportEvent> {
        match signal {
            Signal::ConnAck(ConnectReturnCode::Success) => {
                self.connected = true;
                Some(TransportEvent::Connected(Ok(())))
            }
            Signal::ConnAck(code) => Some(TransportEvent::Connected(Err(
                TransportError::Refused(format!("{:?}", code)),
            ))),
            Signal::Sent => self.complete(Qos::AtMostOnce),
            Signal::Acked => self.complete(Qos::AtLeastOnce),
            Signal::Completed => self.complete(Qos::ExactlyOnce),
            Signal::Closed => {
                self.connected = false;
                Some(TransportEvent::Disconnected(Ok(())))
            }
            Signal::Failed(e) if self.connected => {
                self.connected = false;
                Some(TransportEvent::Disconnected(Err(TransportError::Connection(e))))
            }
            // the connect never got as far as a CONNACK; the session ends
            // here and the watchdog drives the retry
            Signal::Failed(e) => {
                warn!(error = %e, "Error connecting");
                None
            }
        }
    }

    fn complete(&mut self, level: Qos) -> Option<TransportEvent> {
        if self.pending == Some(level) {
            self.pending = None;
            Some(TransportEvent::Published)
        } else {
            None
        }
    }
}

struct Session {
    client: AsyncClient,
    pump: JoinHandle<()>,
    signals: mpsc::UnboundedReceiver<Signal>,
    state: SessionState,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// [`Transport`] backed by a `rumqttc` client.
#[derive(Default)]
pub struct MqttTransport {
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.state.connected)
            .unwrap_or(false)
    }

    fn client(&self) -> Result<&AsyncClient, TransportError> {
        self.session
            .as_ref()
            .map(|s| &s.client)
            .ok_or(TransportError::NotConnected)
    }
}

fn options(broker: &BrokerConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&broker.client_id, &broker.host, broker.port);
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
    options.set_clean_session(true);
    if let Some(username) = &broker.username {
        options.set_credentials(username, broker.password.as_deref().unwrap_or_default());
    }
    options
}

fn to_rumqttc(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

async fn pump(mut eventloop: EventLoop, tx: mpsc::UnboundedSender<Signal>) {
    loop {
        let signal = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => Signal::ConnAck(ack.code),
            Ok(Event::Incoming(Packet::PubAck(_))) => Signal::Acked,
            Ok(Event::Incoming(Packet::PubComp(_))) => Signal::Completed,
            Ok(Event::Outgoing(Outgoing::Publish(_))) => Signal::Sent,
            Ok(Event::Outgoing(Outgoing::Disconnect)) => Signal::Closed,
            Ok(other) => {
                trace!(event = ?other, "MQTT event");
                continue;
            }
            Err(e) => Signal::Failed(e.to_string()),
        };
        let terminal = signal.is_terminal();
        if tx.send(signal).is_err() || terminal {
            break;
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError> {
        // dropping a previous session aborts its pump
        self.session = None;

        let (client, eventloop) = AsyncClient::new(options(broker), REQUEST_CAPACITY);
        let (tx, signals) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump(eventloop, tx));
        debug!(host = %broker.host, port = broker.port, client_id = %broker.client_id, "MQTT session started");

        self.session = Some(Session {
            client,
            pump,
            signals,
            state: SessionState::default(),
        });
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: String,
        qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;
        if !session.state.connected {
            return Err(TransportError::NotConnected);
        }
        session
            .client
            .try_publish(topic, to_rumqttc(qos), retain, payload.into_bytes())
            .map_err(|e| TransportError::Client(e.to_string()))?;
        session.state.pending = Some(qos);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.client()?
            .try_disconnect()
            .map_err(|e| TransportError::Client(e.to_string()))
    }

    async fn iterate(&mut self, block: Duration) -> Vec<TransportEvent> {
        let Some(session) = self.session.as_mut() else {
            tokio::time::sleep(block).await;
            return Vec::new();
        };

        let first = match tokio::time::timeout(block, session.signals.recv()).await {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                // pump finished and everything it sent was consumed
                self.session = None;
                return Vec::new();
            }
            Err(_) => return Vec::new(),
        };

        let mut events = Vec::new();
        events.extend(session.state.translate(first));
        while let Ok(signal) = session.signals.try_recv() {
            events.extend(session.state.translate(signal));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connack_translation() {
        let mut state = SessionState::default();
        assert_eq!(
            state.translate(Signal::ConnAck(ConnectReturnCode::Success)),
            Some(TransportEvent::Connected(Ok(())))
        );
        assert!(state.connected);

        let mut state = SessionState::default();
        let event = state.translate(Signal::ConnAck(ConnectReturnCode::NotAuthorized));
        assert!(matches!(
            event,
            Some(TransportEvent::Connected(Err(TransportError::Refused(_))))
        ));
        assert!(!state.connected);
    }

    #[test]
    fn test_publish_completion_matches_qos() {
        let mut state = SessionState {
            connected: true,
            pending: Some(Qos::ExactlyOnce),
        };
        assert_eq!(state.translate(Signal::Sent), None);
        assert_eq!(state.translate(Signal::Acked), None);
        assert_eq!(state.translate(Signal::Completed), Some(TransportEvent::Published));
        assert_eq!(state.translate(Signal::Completed), None);

        let mut state = SessionState {
            connected: true,
            pending: Some(Qos::AtMostOnce),
        };
        assert_eq!(state.translate(Signal::Sent), Some(TransportEvent::Published));
    }

    #[test]
    fn test_failure_depends_on_connection() {
        let mut state = SessionState::default();
        assert_eq!(state.translate(Signal::Failed("refused".into())), None);
        assert!(!state.connected);

        let mut state = SessionState {
            connected: true,
            pending: None,
        };
        assert!(matches!(
            state.translate(Signal::Failed("reset".into())),
            Some(TransportEvent::Disconnected(Err(_)))
        ));
        assert_eq!(
            SessionState::default().translate(Signal::Closed),
            Some(TransportEvent::Disconnected(Ok(())))
        );
    }

    #[test]
    fn test_terminal_signals() {
        assert!(Signal::Closed.is_terminal());
        assert!(Signal::Failed("x".into()).is_terminal());
        assert!(Signal::ConnAck(ConnectReturnCode::BadUserNamePassword).is_terminal());
        assert!(!Signal::ConnAck(ConnectReturnCode::Success).is_terminal());
        assert!(!Signal::Acked.is_terminal());
    }

    #[tokio::test]
    async fn test_operations_without_session() {
        let mut transport = MqttTransport::new();
        assert!(!transport.is_connected());
        assert_eq!(
            transport
                .publish("t", "{}".to_string(), Qos::AtMostOnce, false)
                .await,
            Err(TransportError::NotConnected)
        );
        assert_eq!(transport.disconnect().await, Err(TransportError::NotConnected));
        assert!(transport.iterate(Duration::from_millis(5)).await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_refused_port_waits_quietly() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let broker = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..BrokerConfig::default()
        };
        let mut transport = MqttTransport::new();
        transport.connect(&broker).await.expect("connect starts");

        let block = Duration::from_millis(50);
        let started = std::time::Instant::now();
        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(transport.iterate(block).await);
        }

        // no completion is reported and, once the session is gone, every
        // iterate blocks for the full wait instead of returning at once
        assert!(events.is_empty(), "unexpected events: {:?}", events);
        assert!(!transport.is_connected());
        assert!(started.elapsed() >= block * 7);
    }
}
