//! Background instance supervision.
//!
//! The foreground CLI and the detached daemon share nothing but the record
//! file and OS signals:
//!
//! - `start` spawns `rpc daemon` in a new session and records its PID
//! - `status` samples the recorded process, clearing stale records
//! - `stop` sends SIGTERM and clears the record
//!
//! The daemon removes its own record on graceful exit with
//! [`release_own_record`].

mod process;
mod record;

pub use process::{
    current_memory_bytes, is_pid_alive, sample_process, OsProcessController, ProcessController,
    ProcessStats, DAEMON_ARG,
};
pub use record::{read_record, remove_record_if_matches, write_record, RecordLock};

use fs_err as fs;
use std::time::Duration;

use crate::config::Paths;
use crate::error::SupervisorError;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const STATUS_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorStatus {
    Running(ProcessStats),
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32 },
    NotRunning,
}

pub struct BackgroundSupervisor<C: ProcessController = OsProcessController> {
    paths: Paths,
    controller: C,
    lock_timeout: Duration,
}

impl BackgroundSupervisor<OsProcessController> {
    pub fn new(paths: Paths) -> Self {
        Self::with_controller(paths, OsProcessController)
    }
}

impl<C: ProcessController> BackgroundSupervisor<C> {
    pub fn with_controller(paths: Paths, controller: C) -> Self {
        Self {
            paths,
            controller,
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Spawns the background instance unless a live one is already recorded.
    pub fn start(&self) -> Result<u32, SupervisorError> {
        fs::create_dir_all(&self.paths.home).map_err(|source| SupervisorError::RecordIo {
            path: self.paths.home.clone(),
            source,
        })?;
        let _lock = RecordLock::acquire(&self.paths.record_lock_dir(), self.lock_timeout)?;
        let record = self.paths.record_file();

        if let Some(pid) = read_record(&record)? {
            if self.controller.is_alive(pid) {
                return Err(SupervisorError::AlreadyRunning { pid });
            }
            tracing::info!(pid, "Clearing stale background record");
            remove_record_if_matches(&record, pid)?;
        }

        let pid = self
            .controller
            .spawn_detached(&self.paths.home)
            .map_err(SupervisorError::SpawnFailed)?;
        write_record(&record, pid)?;
        tracing::info!(pid, "Background process started");
        Ok(pid)
    }

    pub fn status(&self) -> Result<SupervisorStatus, SupervisorError> {
        let record = self.paths.record_file();
        let Some(pid) = read_record(&record)? else {
            return Ok(SupervisorStatus::NotRunning);
        };

        if !self.controller.is_alive(pid) {
            self.clear_stale_record(pid)?;
            return Ok(SupervisorStatus::NotRunning);
        }

        let stats = self
            .controller
            .stats(pid)
            .unwrap_or_else(|| ProcessStats::unknown(pid));
        Ok(SupervisorStatus::Running(stats))
    }

    /// Removes the record of an exited process. A held lock means a `start`
    /// or `stop` is already rewriting the record, so the cleanup is skipped.
    fn clear_stale_record(&self, pid: u32) -> Result<(), SupervisorError> {
        let _lock = match RecordLock::acquire(&self.paths.record_lock_dir(), STATUS_LOCK_TIMEOUT) {
            Ok(lock) => lock,
            Err(SupervisorError::Busy(_)) => {
                tracing::debug!(pid, "Record lock busy, leaving stale record");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if remove_record_if_matches(&self.paths.record_file(), pid)? {
            tracing::info!(pid, "Removed record of exited background process");
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let _lock = RecordLock::acquire(&self.paths.record_lock_dir(), self.lock_timeout)?;
        let record = self.paths.record_file();

        let Some(pid) = read_record(&record)? else {
            return Ok(StopOutcome::NotRunning);
        };

        if !self.controller.is_alive(pid) {
            remove_record_if_matches(&record, pid)?;
            return Ok(StopOutcome::NotRunning);
        }

        let signalled = self.controller.terminate(pid);
        remove_record_if_matches(&record, pid)?;

        match signalled {
            Ok(()) => {
                tracing::info!(pid, "Background process signalled to stop");
                Ok(StopOutcome::Stopped { pid })
            }
            Err(source) => Err(SupervisorError::SignalFailed { pid, source }),
        }
    }
}

/// Compare-and-delete of the record for the calling process.
pub fn release_own_record(paths: &Paths) -> Result<bool, SupervisorError> {
    remove_record_if_matches(&paths.record_file(), std::process::id())
}
