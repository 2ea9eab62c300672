//! Foreground session: terminal rendering and the attached run loop.

use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use simplerpc_core::{
    ActivityPayload, ConnectionState, EnvFileStore, IpcTransport, Paths, PresenceEvent,
    SessionEvent, SessionMode, SessionObserver, SessionOrchestrator, SessionSnapshot,
};

use crate::error::CliError;
use crate::format::format_uptime;
use crate::setup;

const CLEAR_LINE: &str = "\r\x1b[2K";

/// Prints session events as timestamped lines and keeps a live uptime line
/// at the bottom while connected.
pub struct TerminalObserver<W: Write> {
    out: W,
    last_shown: Option<ActivityPayload>,
    status_line: bool,
}

impl<W: Write> TerminalObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_shown: None,
            status_line: false,
        }
    }

    fn line(&mut self, message: &str) -> io::Result<()> {
        if self.status_line {
            write!(self.out, "{}", CLEAR_LINE)?;
            self.status_line = false;
        }
        let stamp = chrono::Local::now().format("%H:%M:%S");
        writeln!(self.out, "[{}] {}", stamp, message)?;
        self.out.flush()
    }

    fn render(&mut self, event: &SessionEvent, snapshot: &SessionSnapshot) -> io::Result<()> {
        match event {
            SessionEvent::Connecting => self.line("Connecting to Discord..."),
            SessionEvent::Presence(PresenceEvent::Ready(identity)) => {
                self.line(&format!("Connected as {}", identity.display_name()))
            }
            SessionEvent::Presence(PresenceEvent::ActivityUpdated(payload)) => {
                if self.last_shown.as_ref() == Some(payload) {
                    return Ok(());
                }
                self.last_shown = Some(payload.clone());
                self.line(&describe_activity(payload))
            }
            SessionEvent::Presence(PresenceEvent::Error { message, .. }) => {
                self.line(&format!("Error: {}", message))
            }
            SessionEvent::Presence(PresenceEvent::Disconnected) => {
                self.last_shown = None;
                self.line("Disconnected from Discord")
            }
            SessionEvent::RetryScheduled { delay, .. } => {
                self.line(&format!("Retrying in {}s", delay.as_secs()))
            }
            SessionEvent::Tick => self.status(snapshot),
            SessionEvent::Heartbeat => Ok(()),
        }
    }

    fn status(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        if snapshot.status != ConnectionState::Connected {
            return Ok(());
        }
        let Some(since) = snapshot.connected_since else {
            return Ok(());
        };
        write!(
            self.out,
            "{}  Connected for {}  (Ctrl+C to quit)",
            CLEAR_LINE,
            format_uptime(since.elapsed())
        )?;
        self.status_line = true;
        self.out.flush()
    }
}

impl<W: Write> SessionObserver for TerminalObserver<W> {
    fn on_event(&mut self, event: &SessionEvent, snapshot: &SessionSnapshot) {
        // stdout gone (closed pipe); nothing useful left to do with the error
        let _ = self.render(event, snapshot);
    }
}

pub fn describe_activity(payload: &ActivityPayload) -> String {
    let mut text = format!(
        "Activity: {} {} | {}",
        payload.kind().label(),
        payload.details,
        payload.state
    );
    if !payload.buttons.is_empty() {
        let labels: Vec<&str> = payload.buttons.iter().map(|b| b.label.as_str()).collect();
        text.push_str(&format!(" [{}]", labels.join(", ")));
    }
    text
}

/// Attached run: runs the wizard first when nothing is configured yet, then
/// keeps the session alive until Ctrl+C or SIGTERM.
pub fn run(paths: &Paths) -> Result<(), CliError> {
    let mut store = EnvFileStore::load(paths.config_file())?;
    if !store.exists() {
        println!("No configuration found. Starting setup.");
        let stdin = io::stdin();
        setup::run(&mut store, false, stdin.lock(), io::stdout())?;
        println!();
    }

    let config = store.snapshot().with_env_overrides();

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    let mut session = SessionOrchestrator::new(SessionMode::Foreground, config, IpcTransport::new());
    session.add_observer(Box::new(TerminalObserver::new(io::stdout())));

    let result = session.run(&shutdown);
    println!();
    result.map_err(CliError::from)
}
