//! Detached background instance (`rpc daemon`, spawned by `rpc detach`).
//!
//! ## Lifecycle
//!
//! 1. Spawned in a new session with null stdio, `SIMPLERPC_HOME` inherited
//! 2. Loads configuration and connects; every failure after that is retried
//!    by the session's reconnect policy
//! 3. Logs an hourly heartbeat with resident memory
//! 4. On SIGTERM/SIGINT: disconnects and removes its own process record

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use simplerpc_core::supervisor::current_memory_bytes;
use simplerpc_core::{
    release_own_record, EnvFileStore, IpcTransport, Paths, PresenceEvent, SessionEvent,
    SessionMode, SessionObserver, SessionOrchestrator, SessionSnapshot,
};
use tracing::{error, info, warn};

use crate::error::CliError;

/// Mirrors session events into the daemon log.
struct HeartbeatLogger;

impl SessionObserver for HeartbeatLogger {
    fn on_event(&mut self, event: &SessionEvent, snapshot: &SessionSnapshot) {
        match event {
            SessionEvent::Heartbeat => {
                let memory_mb = current_memory_bytes().map(|bytes| bytes / 1024 / 1024);
                info!(
                    memory_mb = ?memory_mb,
                    status = snapshot.status.label(),
                    "Heartbeat"
                );
            }
            SessionEvent::Presence(PresenceEvent::Ready(identity)) => {
                info!(user = identity.display_name(), "Presence connected");
            }
            SessionEvent::Presence(PresenceEvent::ActivityUpdated(payload)) => {
                info!(details = %payload.details, state = %payload.state, "Activity set");
            }
            SessionEvent::Presence(PresenceEvent::Disconnected) => {
                info!("Presence disconnected");
            }
            SessionEvent::RetryScheduled { trigger, delay } => {
                info!(trigger = ?trigger, delay_secs = delay.as_secs(), "Retry scheduled");
            }
            // Errors are already logged by the session
            _ => {}
        }
    }
}

pub fn run(paths: &Paths) -> Result<(), CliError> {
    info!(pid = std::process::id(), home = %paths.home.display(), "Background process started");

    let result = run_session(paths);
    if let Err(err) = &result {
        error!(error = %err, "Background session ended with an error");
    }

    match release_own_record(paths) {
        Ok(true) => info!("Process record removed"),
        Ok(false) => {}
        Err(err) => warn!(error = %err, "Failed to remove process record"),
    }
    info!("Background process exiting");
    result
}

fn run_session(paths: &Paths) -> Result<(), CliError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;

    let config = EnvFileStore::load(paths.config_file())?
        .snapshot()
        .with_env_overrides();

    let mut session = SessionOrchestrator::new(SessionMode::Headless, config, IpcTransport::new());
    session.add_observer(Box::new(HeartbeatLogger));
    session.run(&shutdown)?;
    Ok(())
}
