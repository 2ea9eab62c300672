//! One presence session with the desktop client.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected --connect()--> Connecting --login ok--> Connected
//! Connecting   --login fails----------------------> Disconnected
//! Connected    --update ok------------------------> Connected
//! Connected    --transport drops------------------> Disconnected
//! any          --disconnect()---------------------> Disconnected
//! ```
//!
//! `ConnectionState` is only ever written by the methods below. Observers learn
//! about transitions through [`PresenceEvent`]s delivered to the injected
//! [`EventSink`]; nothing here retries on its own.

use std::sync::mpsc;

use crate::activity::{self, ActivityOverrides, ActivityPayload};
use crate::config::ConfigSnapshot;
use crate::error::{ConfigError, ConnectionError, TransportError};
use crate::transport::{Transport, UserIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        }
    }
}

/// Where in the lifecycle an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    /// Handshake or socket open failed; no session was established.
    Login,
    /// The client refused an activity update; the channel is still open.
    Update,
    /// An established session was lost.
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Ready(UserIdentity),
    Error { phase: ErrorPhase, message: String },
    Disconnected,
    ActivityUpdated(ActivityPayload),
}

pub trait EventSink: Send {
    fn emit(&self, event: PresenceEvent);
}

impl EventSink for mpsc::Sender<PresenceEvent> {
    fn emit(&self, event: PresenceEvent) {
        // Receiver gone means nobody is observing any more
        let _ = self.send(event);
    }
}

/// Wall clock used for the session start timestamp (epoch milliseconds).
pub trait Clock: Send {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub struct PresenceConnection<T: Transport> {
    config: ConfigSnapshot,
    transport: T,
    sink: Box<dyn EventSink>,
    clock: Box<dyn Clock>,
    state: ConnectionState,
    channel_open: bool,
    identity: Option<UserIdentity>,
    session_start: Option<i64>,
}

impl<T: Transport> PresenceConnection<T> {
    pub fn new(config: ConfigSnapshot, transport: T, sink: Box<dyn EventSink>) -> Self {
        Self::with_clock(config, transport, sink, Box::new(SystemClock))
    }

    pub fn with_clock(
        config: ConfigSnapshot,
        transport: T,
        sink: Box<dyn EventSink>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport,
            sink,
            clock,
            state: ConnectionState::Disconnected,
            channel_open: false,
            identity: None,
            session_start: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    /// Start timestamp shared by every payload of this connection, fixed by the
    /// first successful login.
    pub fn session_start(&self) -> Option<i64> {
        self.session_start
    }

    /// True once any login on this instance has succeeded.
    pub fn has_had_session(&self) -> bool {
        self.session_start.is_some()
    }

    /// Logs in and pushes the first activity.
    ///
    /// Fails with `Configuration` before touching the transport when no client
    /// id is configured.
    pub fn connect(&mut self) -> Result<UserIdentity, ConnectionError> {
        let client_id = match self.config.client_id() {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => return Err(ConfigError::MissingClientId.into()),
        };

        if self.channel_open {
            self.disconnect();
        }

        self.state = ConnectionState::Connecting;
        tracing::debug!("Connecting to Discord");

        let identity = match self.transport.login(&client_id) {
            Ok(identity) => identity,
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                self.sink.emit(PresenceEvent::Error {
                    phase: ErrorPhase::Login,
                    message: err.to_string(),
                });
                return Err(err.into());
            }
        };

        self.channel_open = true;
        self.state = ConnectionState::Connected;
        if self.session_start.is_none() {
            self.session_start = Some(self.clock.now_millis());
        }
        self.identity = Some(identity.clone());
        tracing::info!(user = %identity.username, "Connected to Discord");
        self.sink.emit(PresenceEvent::Ready(identity.clone()));

        match self.update_activity(None) {
            Ok(_) => Ok(identity),
            // Refused payload: the session itself is fine
            Err(ConnectionError::Transport(err)) if !err.is_fatal() => Ok(identity),
            Err(err) => Err(err),
        }
    }

    /// Sends a freshly built payload. Only valid while connected.
    pub fn update_activity(
        &mut self,
        overrides: Option<&ActivityOverrides>,
    ) -> Result<ActivityPayload, ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }

        let payload = self.build_payload();
        let payload = match overrides {
            Some(overrides) => overrides.apply(payload),
            None => payload,
        };

        match self.transport.set_activity(&payload) {
            Ok(()) => {
                tracing::debug!(details = %payload.details, state = %payload.state, "Activity updated");
                self.sink
                    .emit(PresenceEvent::ActivityUpdated(payload.clone()));
                Ok(payload)
            }
            Err(err) if err.is_fatal() => {
                self.drop_session(&err);
                Err(err.into())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Activity update rejected");
                self.sink.emit(PresenceEvent::Error {
                    phase: ErrorPhase::Update,
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// The payload the next update would send, or `None` when not connected.
    pub fn activity(&self) -> Option<ActivityPayload> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        Some(self.build_payload())
    }

    /// Checks the open channel for a remote close without blocking.
    pub fn poll(&mut self) -> Result<(), ConnectionError> {
        if !self.channel_open {
            return Ok(());
        }
        if let Err(err) = self.transport.poll() {
            self.drop_session(&err);
            return Err(err.into());
        }
        Ok(())
    }

    /// Closes the channel if open. Emits `Disconnected` once per open channel.
    pub fn disconnect(&mut self) {
        if self.channel_open {
            self.transport.close();
            self.channel_open = false;
            tracing::debug!("Disconnected from Discord");
            self.sink.emit(PresenceEvent::Disconnected);
        }
        self.state = ConnectionState::Disconnected;
    }

    fn build_payload(&self) -> ActivityPayload {
        let start = self
            .session_start
            .unwrap_or_else(|| self.clock.now_millis());
        activity::build(&self.config, start)
    }

    fn drop_session(&mut self, err: &TransportError) {
        tracing::warn!(error = %err, "Lost connection to Discord");
        self.sink.emit(PresenceEvent::Error {
            phase: ErrorPhase::Transport,
            message: err.to_string(),
        });
        self.disconnect();
    }
}

impl<T: Transport> Drop for PresenceConnection<T> {
    fn drop(&mut self) {
        if self.channel_open {
            self.transport.close();
        }
    }
}
