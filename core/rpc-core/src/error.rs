//! Error types for simplerpc-core operations.

use std::path::PathBuf;

use simplerpc_protocol::FrameError;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CLIENT_ID is not set")]
    MissingClientId,

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Configuration read failed: {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration write failed: {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Discord client not reachable: {0}")]
    Unavailable(String),

    #[error("Transport is not open")]
    NotOpen,

    /// The socket went away (EOF, reset, close frame after login).
    #[error("Connection to Discord closed: {0}")]
    Closed(String),

    /// The client answered but refused the request.
    #[error("Discord rejected the request ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// The payload was refused locally before anything was sent.
    #[error("Activity payload not sent: {0}")]
    InvalidPayload(String),

    #[error("RPC protocol error: {0}")]
    Protocol(String),

    #[error("Timed out waiting for Discord")]
    Timeout,
}

impl TransportError {
    /// True when the channel can no longer be used and the session is lost.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TransportError::Rejected { .. } | TransportError::InvalidPayload(_)
        )
    }
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        if err.is_disconnect() {
            return TransportError::Closed(err.to_string());
        }
        match err {
            FrameError::Io(io)
                if matches!(
                    io.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                TransportError::Timeout
            }
            FrameError::Io(io) => TransportError::Closed(io.to_string()),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Connection
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Client not connected")]
    NotConnected,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Background supervision
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Background process already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("Failed to spawn background process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Background record I/O failed: {path}: {source}")]
    RecordIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Another start/stop is in progress (lock held at {0})")]
    Busy(PathBuf),

    #[error("Failed to signal process {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Umbrella
// ═══════════════════════════════════════════════════════════════════════════════

/// Any failure surfaced by simplerpc-core, for callers that do not care which
/// layer produced it.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

pub type Result<T> = std::result::Result<T, RpcError>;

impl From<RpcError> for String {
    fn from(err: RpcError) -> String {
        err.to_string()
    }
}
