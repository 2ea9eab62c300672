//! The on-disk record naming the running background process.
//!
//! The record is a single decimal PID in a plain text file. Writes go through
//! a temp file and rename; removals are compare-and-delete so a process never
//! deletes a record that a newer instance has since written.
//!
//! Read-check-write sequences run under a [`RecordLock`], an atomic
//! `create_dir` next to the record with its holder's PID inside.

use fs_err as fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::SupervisorError;

use super::process::is_pid_alive;

const LOCK_PID_FILE: &str = "pid";
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

fn record_io(path: &Path, source: std::io::Error) -> SupervisorError {
    SupervisorError::RecordIo {
        path: path.to_path_buf(),
        source,
    }
}

/// Returns the recorded PID. A missing or unparsable record reads as `None`.
pub fn read_record(path: &Path) -> Result<Option<u32>, SupervisorError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(record_io(path, err)),
    };

    match content.trim().parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(Some(pid)),
        _ => {
            tracing::warn!(path = %path.display(), "Ignoring malformed process record");
            Ok(None)
        }
    }
}

pub fn write_record(path: &Path, pid: u32) -> Result<(), SupervisorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| record_io(parent, err))?;
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, format!("{}\n", pid)).map_err(|err| record_io(&tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| record_io(path, err))?;
    Ok(())
}

/// Deletes the record only if it still names `pid`. Returns whether a file was
/// removed.
pub fn remove_record_if_matches(path: &Path, pid: u32) -> Result<bool, SupervisorError> {
    match read_record(path)? {
        Some(recorded) if recorded == pid => {}
        Some(recorded) => {
            tracing::debug!(recorded, pid, "Record belongs to another process, leaving it");
            return Ok(false);
        }
        None => return Ok(false),
    }

    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(record_io(path, err)),
    }
}

/// Exclusive hold on the record lock directory, released on drop.
#[derive(Debug)]
pub struct RecordLock {
    dir: PathBuf,
}

impl RecordLock {
    pub fn acquire(dir: &Path, timeout: Duration) -> Result<Self, SupervisorError> {
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(|err| record_io(parent, err))?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match fs::create_dir(dir) {
                Ok(()) => {
                    let lock = RecordLock {
                        dir: dir.to_path_buf(),
                    };
                    fs::write(dir.join(LOCK_PID_FILE), std::process::id().to_string())
                        .map_err(|err| record_io(dir, err))?;
                    return Ok(lock);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if Self::holder_is_gone(dir) {
                        tracing::info!(path = %dir.display(), "Taking over stale record lock");
                        let _ = fs::remove_dir_all(dir);
                        continue;
                    }
                }
                Err(err) => return Err(record_io(dir, err)),
            }

            if Instant::now() >= deadline {
                return Err(SupervisorError::Busy(dir.to_path_buf()));
            }
            thread::sleep(LOCK_RETRY_INTERVAL);
        }
    }

    // A lock dir with no pid file yet may be mid-creation; treat it as held.
    fn holder_is_gone(dir: &Path) -> bool {
        let Ok(content) = fs::read_to_string(dir.join(LOCK_PID_FILE)) else {
            return false;
        };
        match content.trim().parse::<u32>() {
            Ok(pid) => !is_pid_alive(pid),
            Err(_) => true,
        }
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            tracing::warn!(error = %err, "Failed to release record lock");
        }
    }
}
