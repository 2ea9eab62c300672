//! # simplerpc-core
//!
//! Presence session core for SimpleRPC: keeps a Discord rich presence alive
//! from a flat key/value configuration, in the foreground or as a detached
//! background process.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. One thread drives the session loop.
//! - **Injected seams**: transport, clock, event sink and process control are
//!   traits so every state transition can be driven from tests.
//! - **Single writer**: only [`PresenceConnection`] mutates connection state;
//!   everyone else observes events.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use simplerpc_core::{EnvFileStore, IpcTransport, Paths, SessionMode, SessionOrchestrator};
//!
//! let paths = Paths::resolve()?;
//! let config = EnvFileStore::load(paths.config_file())?.snapshot().with_env_overrides();
//! let mut session = SessionOrchestrator::new(SessionMode::Foreground, config, IpcTransport::new());
//! session.run(&shutdown)?;
//! ```

pub mod activity;
pub mod config;
pub mod connection;
pub mod error;
pub mod reconnect;
pub mod session;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testing;

pub use activity::{build, ActivityKind, ActivityOverrides, ActivityPayload, Button};
pub use config::{ConfigSnapshot, ConfigStore, EnvFileStore, Paths, KNOWN_KEYS};
pub use connection::{
    Clock, ConnectionState, ErrorPhase, EventSink, PresenceConnection, PresenceEvent, SystemClock,
};
pub use error::{
    ConfigError, ConnectionError, Result, RpcError, SupervisorError, TransportError,
};
pub use reconnect::{PendingRetry, ReconnectPolicy, RetryTrigger};
pub use session::{SessionEvent, SessionMode, SessionObserver, SessionOrchestrator, SessionSnapshot};
pub use supervisor::{
    release_own_record, BackgroundSupervisor, OsProcessController, ProcessController, ProcessStats,
    StopOutcome, SupervisorStatus,
};
pub use transport::{IpcTransport, Transport, UserIdentity};
