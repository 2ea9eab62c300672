//! Session orchestration: one connection, one reconnect policy, many observers.
//!
//! Everything runs on the caller's thread. Presence events are queued on an
//! mpsc channel by the connection and drained after every operation, so there
//! is never more than one activity update in flight and observers always see
//! events in the order they happened.
//!
//! | Event | Reaction |
//! |-------|----------|
//! | `Error{Login}` before any session | 60 s repeating retry |
//! | `Error{Login}` after a session existed | 30 s one-shot retry |
//! | `Error{Transport}` / unexpected `Disconnected` | 10 s one-shot retry |
//! | `Error{Update}` | none, session stays up |
//! | `Ready` | pending retry cleared |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::activity::{ActivityOverrides, ActivityPayload};
use crate::config::ConfigSnapshot;
use crate::connection::{
    Clock, ConnectionState, ErrorPhase, PresenceConnection, PresenceEvent, SystemClock,
};
use crate::error::ConnectionError;
use crate::reconnect::{ReconnectPolicy, RetryTrigger};
use crate::transport::{Transport, UserIdentity};

const REFRESH_INTERVAL: Duration = Duration::from_secs(15);
const TICK_INTERVAL: Duration = Duration::from_secs(1);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3600);
const LOOP_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Attached to a terminal; ticks every second for the uptime display.
    Foreground,
    /// Detached daemon; emits an hourly heartbeat instead of ticks.
    Headless,
}

impl SessionMode {
    pub fn refresh_interval(self) -> Duration {
        REFRESH_INTERVAL
    }

    pub fn tick_interval(self) -> Duration {
        match self {
            SessionMode::Foreground => TICK_INTERVAL,
            SessionMode::Headless => HEARTBEAT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connecting,
    Presence(PresenceEvent),
    RetryScheduled { trigger: RetryTrigger, delay: Duration },
    Tick,
    Heartbeat,
}

/// Read-only view handed to observers alongside every event.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: SessionMode,
    pub status: ConnectionState,
    pub identity: Option<UserIdentity>,
    pub last_activity: Option<ActivityPayload>,
    pub last_error: Option<String>,
    pub connected_since: Option<Instant>,
    pub next_retry: Option<Instant>,
}

impl SessionSnapshot {
    fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            status: ConnectionState::Disconnected,
            identity: None,
            last_activity: None,
            last_error: None,
            connected_since: None,
            next_retry: None,
        }
    }

    pub fn connected_for(&self, now: Instant) -> Option<Duration> {
        self.connected_since
            .map(|since| now.saturating_duration_since(since))
    }
}

pub trait SessionObserver {
    fn on_event(&mut self, event: &SessionEvent, snapshot: &SessionSnapshot);
}

pub struct SessionOrchestrator<T: Transport> {
    mode: SessionMode,
    connection: PresenceConnection<T>,
    events: mpsc::Receiver<PresenceEvent>,
    policy: ReconnectPolicy,
    observers: Vec<Box<dyn SessionObserver>>,
    snapshot: SessionSnapshot,
    next_refresh: Option<Instant>,
    next_tick: Option<Instant>,
    stopping: bool,
}

impl<T: Transport> SessionOrchestrator<T> {
    pub fn new(mode: SessionMode, config: ConfigSnapshot, transport: T) -> Self {
        Self::with_clock(mode, config, transport, Box::new(SystemClock))
    }

    pub fn with_clock(
        mode: SessionMode,
        config: ConfigSnapshot,
        transport: T,
        clock: Box<dyn Clock>,
    ) -> Self {
        let (sender, events) = mpsc::channel();
        let connection = PresenceConnection::with_clock(config, transport, Box::new(sender), clock);
        Self {
            mode,
            connection,
            events,
            policy: ReconnectPolicy::new(),
            observers: Vec::new(),
            snapshot: SessionSnapshot::new(mode),
            next_refresh: None,
            next_tick: None,
            stopping: false,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn connection(&self) -> &PresenceConnection<T> {
        &self.connection
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// First connect. Only a configuration problem is returned; transport
    /// failures are left to the reconnect policy.
    pub fn start(&mut self, now: Instant) -> Result<(), ConnectionError> {
        self.connection.config().validate()?;
        self.stopping = false;
        self.next_tick = Some(now + self.mode.tick_interval());
        tracing::info!(mode = ?self.mode, "Starting presence session");

        match self.attempt_connect(now) {
            Err(ConnectionError::Configuration(err)) => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// One pass of the loop: channel health, due retries, refresh and ticks.
    pub fn step(&mut self, now: Instant) {
        if self.connection.poll().is_err() {
            self.drain_events(now);
        }

        if let Some(trigger) = self.policy.poll_due(now) {
            self.snapshot.next_retry = self.policy.next_due();
            if !self.connection.is_connected() {
                tracing::info!(trigger = ?trigger, "Retrying connection");
                if let Err(err) = self.attempt_connect(now) {
                    tracing::debug!(error = %err, "Reconnect attempt failed");
                }
            }
        }

        if self.connection.is_connected() && self.next_refresh.is_some_and(|due| now >= due) {
            self.next_refresh = Some(now + self.mode.refresh_interval());
            // Failures arrive as events
            let _ = self.connection.update_activity(None);
            self.drain_events(now);
        }

        if let Some(due) = self.next_tick {
            if now >= due {
                self.next_tick = Some(now + self.mode.tick_interval());
                let event = match self.mode {
                    SessionMode::Foreground => SessionEvent::Tick,
                    SessionMode::Headless => SessionEvent::Heartbeat,
                };
                self.notify(event);
            }
        }
    }

    /// Pushes an update immediately, optionally with per-call overrides.
    pub fn refresh(
        &mut self,
        overrides: Option<&ActivityOverrides>,
        now: Instant,
    ) -> Result<ActivityPayload, ConnectionError> {
        let result = self.connection.update_activity(overrides);
        if result.is_ok() {
            self.next_refresh = Some(now + self.mode.refresh_interval());
        }
        self.drain_events(now);
        result
    }

    /// Runs `start` then `step` until `shutdown` is set, then disconnects.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), ConnectionError> {
        self.start(Instant::now())?;
        while !shutdown.load(Ordering::SeqCst) {
            self.step(Instant::now());
            thread::sleep(LOOP_INTERVAL);
        }
        self.shutdown(Instant::now());
        Ok(())
    }

    /// Cancels pending retries and closes the channel without scheduling another.
    pub fn shutdown(&mut self, now: Instant) {
        tracing::info!("Stopping presence session");
        self.stopping = true;
        self.policy.cancel();
        self.snapshot.next_retry = None;
        self.connection.disconnect();
        self.drain_events(now);
    }

    fn attempt_connect(&mut self, now: Instant) -> Result<UserIdentity, ConnectionError> {
        self.snapshot.status = ConnectionState::Connecting;
        self.snapshot.last_error = None;
        self.notify(SessionEvent::Connecting);

        let result = self.connection.connect();
        if result.is_ok() {
            self.next_refresh = Some(now + self.mode.refresh_interval());
        }
        self.drain_events(now);
        result
    }

    fn drain_events(&mut self, now: Instant) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_presence(event, now);
        }
    }

    fn handle_presence(&mut self, event: PresenceEvent, now: Instant) {
        let mut retry = None;

        match &event {
            PresenceEvent::Ready(identity) => {
                self.policy.on_connected();
                self.snapshot.status = ConnectionState::Connected;
                self.snapshot.identity = Some(identity.clone());
                self.snapshot.connected_since = Some(now);
                self.snapshot.last_error = None;
                self.snapshot.next_retry = None;
            }
            PresenceEvent::ActivityUpdated(payload) => {
                self.snapshot.last_activity = Some(payload.clone());
            }
            PresenceEvent::Error { phase, message } => {
                tracing::warn!(phase = ?phase, error = %message, "Presence error");
                if *phase != ErrorPhase::Update {
                    self.snapshot.status = ConnectionState::Error;
                }
                self.snapshot.last_error = Some(message.clone());
                retry = match phase {
                    ErrorPhase::Login if self.connection.has_had_session() => {
                        Some(RetryTrigger::LoginFailed)
                    }
                    ErrorPhase::Login => Some(RetryTrigger::InitialConnectFailed),
                    ErrorPhase::Transport => Some(RetryTrigger::SessionLost),
                    ErrorPhase::Update => None,
                };
            }
            PresenceEvent::Disconnected => {
                if self.snapshot.status != ConnectionState::Error {
                    self.snapshot.status = ConnectionState::Disconnected;
                }
                self.snapshot.connected_since = None;
                if !self.stopping {
                    retry = Some(RetryTrigger::SessionLost);
                }
            }
        }

        self.notify(SessionEvent::Presence(event));

        if let Some(trigger) = retry {
            if self.stopping {
                return;
            }
            if self.policy.schedule(trigger, now) {
                self.snapshot.next_retry = self.policy.next_due();
                self.notify(SessionEvent::RetryScheduled {
                    trigger,
                    delay: trigger.delay(),
                });
            }
        }
    }

    fn notify(&mut self, event: SessionEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event, &self.snapshot);
        }
    }
}
