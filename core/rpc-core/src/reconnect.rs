//! Reconnect timing.
//!
//! Callers report what went wrong; the policy decides when the next connect
//! attempt is due. Only one timer exists at a time and time is always passed
//! in, never read from the system.

use std::time::{Duration, Instant};

const SESSION_LOST_SECS: u64 = 10;
const LOGIN_FAILED_SECS: u64 = 30;
const INITIAL_RETRY_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTrigger {
    /// An established session dropped.
    SessionLost,
    /// Login or protocol failure after a session existed at some point.
    LoginFailed,
    /// The first connect failed and nothing has succeeded yet.
    InitialConnectFailed,
}

impl RetryTrigger {
    pub fn delay(self) -> Duration {
        match self {
            RetryTrigger::SessionLost => Duration::from_secs(SESSION_LOST_SECS),
            RetryTrigger::LoginFailed => Duration::from_secs(LOGIN_FAILED_SECS),
            RetryTrigger::InitialConnectFailed => Duration::from_secs(INITIAL_RETRY_SECS),
        }
    }

    pub fn repeats(self) -> bool {
        matches!(self, RetryTrigger::InitialConnectFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    pub trigger: RetryTrigger,
    pub due: Instant,
}

#[derive(Debug, Default)]
pub struct ReconnectPolicy {
    pending: Option<PendingRetry>,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer for `trigger`. Returns false when one is already pending.
    pub fn schedule(&mut self, trigger: RetryTrigger, now: Instant) -> bool {
        if let Some(pending) = self.pending {
            tracing::debug!(
                requested = ?trigger,
                pending = ?pending.trigger,
                "Reconnect already scheduled"
            );
            return false;
        }

        let delay = trigger.delay();
        tracing::info!(trigger = ?trigger, delay_secs = delay.as_secs(), "Reconnect scheduled");
        self.pending = Some(PendingRetry {
            trigger,
            due: now + delay,
        });
        true
    }

    /// Returns the trigger when an attempt is due. One-shot timers are consumed;
    /// the repeating timer is re-armed from `now`.
    pub fn poll_due(&mut self, now: Instant) -> Option<RetryTrigger> {
        let pending = self.pending?;
        if now < pending.due {
            return None;
        }

        if pending.trigger.repeats() {
            self.pending = Some(PendingRetry {
                trigger: pending.trigger,
                due: now + pending.trigger.delay(),
            });
        } else {
            self.pending = None;
        }
        Some(pending.trigger)
    }

    pub fn on_connected(&mut self) {
        if self.pending.take().is_some() {
            tracing::debug!("Reconnect timer cleared after connect");
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<PendingRetry> {
        self.pending
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.due)
    }
}
