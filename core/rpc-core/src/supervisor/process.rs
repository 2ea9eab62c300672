//! OS process control for the background instance.

use std::env;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, System};

use crate::config::HOME_ENV;

/// Hidden subcommand the detached child is started with.
pub const DAEMON_ARG: &str = "daemon";

/// Resource usage of a running process at the moment it was sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessStats {
    pub pid: u32,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub uptime: Duration,
}

impl ProcessStats {
    /// Stats for a process that is alive but could not be sampled.
    pub fn unknown(pid: u32) -> Self {
        Self {
            pid,
            cpu_percent: 0.0,
            memory_bytes: 0,
            uptime: Duration::ZERO,
        }
    }
}

pub trait ProcessController: Send {
    /// Starts the background instance detached from the terminal and returns
    /// its PID.
    fn spawn_detached(&self, home: &Path) -> io::Result<u32>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Requests graceful termination.
    fn terminate(&self, pid: u32) -> io::Result<()>;

    fn stats(&self, pid: u32) -> Option<ProcessStats>;
}

pub fn is_pid_alive(pid: u32) -> bool {
    // kill(0, ..) and negative pids address process groups
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs only the existence and permission check.
        if unsafe { libc::kill(pid as i32, 0) } == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Samples CPU, resident memory and uptime for one PID.
///
/// CPU usage needs two refreshes spaced by sysinfo's minimum interval, so this
/// blocks briefly.
pub fn sample_process(pid: u32) -> Option<ProcessStats> {
    let mut sys = System::new();
    let sys_pid = Pid::from(pid as usize);
    let kind = ProcessRefreshKind::new().with_cpu().with_memory();

    if !sys.refresh_process_specifics(sys_pid, kind) {
        return None;
    }
    thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_process_specifics(sys_pid, kind);

    sys.process(sys_pid).map(|process| ProcessStats {
        pid,
        cpu_percent: process.cpu_usage(),
        memory_bytes: process.memory(),
        uptime: Duration::from_secs(process.run_time()),
    })
}

/// Resident memory of the current process, for heartbeat logging.
pub fn current_memory_bytes() -> Option<u64> {
    let mut sys = System::new();
    let sys_pid = Pid::from(std::process::id() as usize);
    sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new().with_memory());
    sys.process(sys_pid).map(|process| process.memory())
}

/// Re-executes the current binary with [`DAEMON_ARG`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessController;

impl ProcessController for OsProcessController {
    fn spawn_detached(&self, home: &Path) -> io::Result<u32> {
        let exe = env::current_exe()?;
        let mut command = Command::new(exe);
        command
            .arg(DAEMON_ARG)
            .env(HOME_ENV, home)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and touches no parent state.
            unsafe {
                command.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let child = command.spawn()?;
        Ok(child.id())
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_pid_alive(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        if pid == 0 || pid > i32::MAX as u32 {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        #[cfg(unix)]
        {
            // SAFETY: plain signal delivery to a single positive pid.
            if unsafe { libc::kill(pid as i32, libc::SIGTERM) } == 0 {
                return Ok(());
            }
            Err(io::Error::last_os_error())
        }
        #[cfg(not(unix))]
        {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }

    fn stats(&self, pid: u32) -> Option<ProcessStats> {
        sample_process(pid)
    }
}
