//! `detach`, `status` and `stop`: user-facing wrappers over the supervisor.
//!
//! Each returns whether the command achieved what was asked, which `main`
//! turns into the exit code. Unexpected failures propagate as errors.

use std::io::Write;

use simplerpc_core::{
    BackgroundSupervisor, ConfigSnapshot, ProcessController, StopOutcome, SupervisorError,
    SupervisorStatus,
};

use crate::error::CliError;
use crate::format::{format_megabytes, format_uptime};

pub fn detach<C, W>(
    supervisor: &BackgroundSupervisor<C>,
    config: &ConfigSnapshot,
    out: &mut W,
) -> Result<bool, CliError>
where
    C: ProcessController,
    W: Write,
{
    if config.validate().is_err() {
        writeln!(out, "No Discord client id is configured. Run `rpc setup` first.")?;
        return Ok(false);
    }

    match supervisor.start() {
        Ok(pid) => {
            writeln!(out, "SimpleRPC is now running in the background (PID: {})", pid)?;
            writeln!(out, "  rpc status   check the background process")?;
            writeln!(out, "  rpc stop     stop the background process")?;
            Ok(true)
        }
        Err(SupervisorError::AlreadyRunning { pid }) => {
            writeln!(out, "SimpleRPC is already running in the background (PID: {})", pid)?;
            writeln!(out, "  Use `rpc stop` before starting a new instance.")?;
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

pub fn status<C, W>(supervisor: &BackgroundSupervisor<C>, out: &mut W) -> Result<bool, CliError>
where
    C: ProcessController,
    W: Write,
{
    match supervisor.status()? {
        SupervisorStatus::Running(stats) => {
            writeln!(out, "SimpleRPC is running in the background (PID: {})", stats.pid)?;
            writeln!(
                out,
                "  CPU: {:.1}%, Memory: {}",
                stats.cpu_percent,
                format_megabytes(stats.memory_bytes)
            )?;
            writeln!(out, "  Uptime: {}", format_uptime(stats.uptime))?;
        }
        SupervisorStatus::NotRunning => {
            writeln!(out, "No SimpleRPC background process is running")?;
        }
    }
    Ok(true)
}

pub fn stop<C, W>(supervisor: &BackgroundSupervisor<C>, out: &mut W) -> Result<bool, CliError>
where
    C: ProcessController,
    W: Write,
{
    match supervisor.stop()? {
        StopOutcome::Stopped { pid } => {
            writeln!(out, "SimpleRPC background process (PID: {}) has been stopped", pid)?;
        }
        StopOutcome::NotRunning => {
            writeln!(out, "No SimpleRPC background process is running")?;
        }
    }
    Ok(true)
}
