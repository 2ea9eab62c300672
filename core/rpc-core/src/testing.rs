//! Scripted fakes shared by the unit tests.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::Path;
use std::time::Duration;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::activity::ActivityPayload;
use crate::connection::{Clock, EventSink, PresenceEvent};
use crate::error::TransportError;
use crate::session::{SessionEvent, SessionObserver, SessionSnapshot};
use crate::supervisor::{ProcessController, ProcessStats};
use crate::transport::{Transport, UserIdentity};

#[derive(Debug, Default)]
pub struct FakeLog {
    pub logins: usize,
    pub closes: usize,
    pub sent: Vec<ActivityPayload>,
    pub open: bool,
    login_failures: VecDeque<TransportError>,
    update_failures: VecDeque<TransportError>,
    remote_closed: bool,
}

/// In-memory transport. Clones share the same log so a test can keep a
/// handle after moving one into a connection.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    log: Arc<Mutex<FakeLog>>,
}

impl FakeTransport {
    pub fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }

    pub fn fail_next_login(&self, err: TransportError) {
        self.log.lock().unwrap().login_failures.push_back(err);
    }

    pub fn fail_next_update(&self, err: TransportError) {
        self.log.lock().unwrap().update_failures.push_back(err);
    }

    pub fn close_remotely(&self) {
        self.log.lock().unwrap().remote_closed = true;
    }
}

impl Transport for FakeTransport {
    fn login(&mut self, _client_id: &str) -> Result<UserIdentity, TransportError> {
        let mut log = self.log.lock().unwrap();
        log.logins += 1;
        if let Some(err) = log.login_failures.pop_front() {
            return Err(err);
        }
        log.open = true;
        log.remote_closed = false;
        Ok(UserIdentity {
            id: "42".into(),
            username: "tester".into(),
            global_name: None,
        })
    }

    fn set_activity(&mut self, activity: &ActivityPayload) -> Result<(), TransportError> {
        let mut log = self.log.lock().unwrap();
        if !log.open {
            return Err(TransportError::NotOpen);
        }
        if let Some(err) = log.update_failures.pop_front() {
            if err.is_fatal() {
                log.open = false;
            }
            return Err(err);
        }
        log.sent.push(activity.clone());
        Ok(())
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        let mut log = self.log.lock().unwrap();
        if log.open && log.remote_closed {
            log.open = false;
            log.remote_closed = false;
            return Err(TransportError::Closed("remote closed".into()));
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.open = false;
        log.closes += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PresenceEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PresenceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PresenceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// Advances by `step` milliseconds on every read.
#[derive(Debug)]
pub struct SteppingClock {
    next: AtomicI64,
    step: i64,
}

impl SteppingClock {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now_millis(&self) -> i64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    spawn_pid: u32,
    spawned: usize,
    alive: HashSet<u32>,
    terminated: Vec<u32>,
    fail_terminate: bool,
}

/// Process controller that never touches the OS.
#[derive(Debug, Clone, Default)]
pub struct FakeController {
    state: Arc<Mutex<ControllerState>>,
}

impl FakeController {
    pub fn spawning(pid: u32) -> Self {
        let controller = Self::default();
        controller.state.lock().unwrap().spawn_pid = pid;
        controller
    }

    pub fn set_alive(&self, pid: u32) {
        self.state.lock().unwrap().alive.insert(pid);
    }

    pub fn fail_terminate(&self) {
        self.state.lock().unwrap().fail_terminate = true;
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawned
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().unwrap().terminated.clone()
    }
}

impl ProcessController for FakeController {
    fn spawn_detached(&self, _home: &Path) -> io::Result<u32> {
        let mut state = self.state.lock().unwrap();
        state.spawned += 1;
        let pid = state.spawn_pid;
        state.alive.insert(pid);
        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().alive.contains(&pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_terminate {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        state.alive.remove(&pid);
        state.terminated.push(pid);
        Ok(())
    }

    fn stats(&self, pid: u32) -> Option<ProcessStats> {
        self.is_alive(pid).then(|| ProcessStats {
            pid,
            cpu_percent: 1.5,
            memory_bytes: 1024 * 1024,
            uptime: Duration::from_secs(90),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_event(&mut self, event: &SessionEvent, _snapshot: &SessionSnapshot) {
        self.events.lock().unwrap().push(event.clone());
    }
}
