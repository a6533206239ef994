//! Connect / publish / disconnect state machine.
//!
//! ```text
//!   Init ──connect──▶ Connecting ──Connected(ok)──▶ Publishing
//!    ▲                                                  │ Published
//!    │ publish timer                                    ▼
//! Disconnected ◀──Disconnected── Disconnecting ◀────────┘
//! ```
//!
//! Every waiting state except `Disconnected` is guarded by the watchdog timer.
//! When it fires the session is torn down and the machine restarts from
//! `Init`. The machine never touches the transport itself; it returns
//! [`Command`]s for the caller to execute.
//!
//! A connect refused by the broker restarts from `Init` straight away. A
//! connect that failed below MQTT keeps the machine in `Connecting` until the
//! watchdog fires.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::timer::{TimerId, Timers};
use crate::transport::TransportEvent;

/// Publisher connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Init,
    Disconnected,
    Disconnecting,
    Connecting,
    Publishing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Init => "INIT",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Publishing => "PUBLISHING",
        }
    }

    /// States waiting on a transport completion.
    pub fn is_guarded(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Publishing | ConnectionState::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport operation requested by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    /// Read sensors, build the payload and publish it
    Publish,
    Disconnect,
}

/// Counters kept across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Full Init → Disconnected traversals
    pub completed: u64,
    pub watchdog_resets: u64,
    /// Resets caused by an explicit transport failure
    pub failures: u64,
}

/// The publish state machine.
#[derive(Debug, Clone)]
pub struct PublishMachine {
    state: ConnectionState,
    timers: Timers,
    watchdog: Duration,
    interval: Duration,
    stats: CycleStats,
}

impl PublishMachine {
    pub fn new(watchdog: Duration, interval: Duration) -> Self {
        Self {
            state: ConnectionState::Init,
            timers: Timers::new(),
            watchdog,
            interval,
            stats: CycleStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Evaluate the current state against the timers.
    pub fn poll(&mut self, now: Instant) -> Option<Command> {
        debug!(state = %self.state, "Polling");
        match self.state {
            ConnectionState::Init => {
                info!("Connecting");
                self.enter(ConnectionState::Connecting, now);
                Some(Command::Connect)
            }
            ConnectionState::Connecting
            | ConnectionState::Publishing
            | ConnectionState::Disconnecting => {
                if !self.timers.expired(TimerId::Watchdog, now) {
                    return None;
                }
                warn!(state = %self.state, "Watchdog timed out");
                self.stats.watchdog_resets += 1;
                self.reset();
                Some(Command::Disconnect)
            }
            ConnectionState::Disconnected => {
                if self.timers.expired(TimerId::Publish, now) {
                    self.state = ConnectionState::Init;
                }
                None
            }
        }
    }

    /// Apply a transport completion.
    pub fn on_event(&mut self, event: &TransportEvent, now: Instant) -> Option<Command> {
        match (self.state, event) {
            (ConnectionState::Connecting, TransportEvent::Connected(Ok(()))) => {
                info!("Connected");
                self.enter(ConnectionState::Publishing, now);
                Some(Command::Publish)
            }
            (
                ConnectionState::Connecting,
                TransportEvent::Connected(Err(e @ TransportError::Refused(_))),
            ) => {
                error!(error = %e, "Error connecting");
                self.fail();
                None
            }
            (ConnectionState::Connecting, TransportEvent::Connected(Err(e))) => {
                // never reached the broker; the watchdog paces the retry
                warn!(error = %e, "Connect did not complete, waiting for watchdog");
                None
            }
            (ConnectionState::Publishing, TransportEvent::Published) => {
                info!("Published");
                self.enter(ConnectionState::Disconnecting, now);
                Some(Command::Disconnect)
            }
            (ConnectionState::Disconnecting, TransportEvent::Disconnected(result)) => {
                if let Err(e) = result {
                    warn!(error = %e, "Disconnect did not complete cleanly");
                }
                info!("Disconnected");
                self.timers.cancel(TimerId::Watchdog);
                self.timers.arm(TimerId::Publish, self.interval, now);
                self.state = ConnectionState::Disconnected;
                self.stats.completed += 1;
                None
            }
            (
                ConnectionState::Connecting | ConnectionState::Publishing,
                TransportEvent::Disconnected(result),
            ) => {
                match result {
                    Ok(()) => warn!(state = %self.state, "Unexpected disconnect"),
                    Err(e) => warn!(state = %self.state, error = %e, "Connection lost"),
                }
                self.fail();
                None
            }
            (state, event) => {
                debug!(state = %state, event = %event, "Ignoring stale transport event");
                None
            }
        }
    }

    /// The publish could not be queued; tear the session down.
    pub fn publish_failed(&mut self) -> Option<Command> {
        if self.state != ConnectionState::Publishing {
            return None;
        }
        self.fail();
        Some(Command::Disconnect)
    }

    fn enter(&mut self, state: ConnectionState, now: Instant) {
        self.state = state;
        self.timers.arm(TimerId::Watchdog, self.watchdog, now);
    }

    fn fail(&mut self) {
        self.stats.failures += 1;
        self.reset();
    }

    fn reset(&mut self) {
        self.timers.cancel(TimerId::Watchdog);
        self.state = ConnectionState::Init;
    }
}
