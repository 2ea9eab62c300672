//! IPC transport to the Discord desktop client.
//!
//! [`Transport`] is the seam between the presence state machine and the
//! socket. [`IpcTransport`] speaks the local RPC protocol over the
//! `discord-ipc-N` Unix socket; tests substitute scripted fakes.

use serde::{Deserialize, Serialize};
use simplerpc_protocol::{
    read_frame, write_frame, CommandRequest, CommandResponse, Handshake, Opcode, SetActivityArgs,
    Command, ErrorInfo, FrameError,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::activity::ActivityPayload;
use crate::error::TransportError;

const SOCKET_PREFIX: &str = "discord-ipc-";
const SOCKET_SLOTS: u8 = 10;
const SANDBOX_SUBDIRS: [&str; 3] = ["", "snap.discord", "app/com.discordapp.Discord"];
const READ_TIMEOUT_SECS: u64 = 5;
const WRITE_TIMEOUT_SECS: u64 = 5;
/// Frames that may arrive before the response we are waiting for.
const MAX_INTERLEAVED_FRAMES: usize = 16;

/// The account the desktop client reports after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
}

impl UserIdentity {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

pub trait Transport: Send {
    /// Opens the channel and performs the login handshake.
    fn login(&mut self, client_id: &str) -> Result<UserIdentity, TransportError>;

    fn set_activity(&mut self, activity: &ActivityPayload) -> Result<(), TransportError>;

    /// Non-blocking check for remote close or keepalive traffic.
    fn poll(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Closes the channel. Safe to call when nothing is open.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn login(&mut self, client_id: &str) -> Result<UserIdentity, TransportError> {
        (**self).login(client_id)
    }

    fn set_activity(&mut self, activity: &ActivityPayload) -> Result<(), TransportError> {
        (**self).set_activity(activity)
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        (**self).poll()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Candidate socket paths, in the order the desktop client's SDK probes them.
pub fn socket_candidates() -> Vec<PathBuf> {
    let mut bases = Vec::new();
    for var in ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"] {
        if let Ok(value) = env::var(var) {
            if !value.trim().is_empty() {
                bases.push(PathBuf::from(value));
            }
        }
    }
    bases.push(PathBuf::from("/tmp"));
    bases.dedup();

    let mut candidates = Vec::new();
    for base in &bases {
        for subdir in SANDBOX_SUBDIRS {
            let dir = if subdir.is_empty() {
                base.clone()
            } else {
                base.join(subdir)
            };
            for slot in 0..SOCKET_SLOTS {
                candidates.push(dir.join(format!("{}{}", SOCKET_PREFIX, slot)));
            }
        }
    }
    candidates
}

// ─────────────────────────────────────────────────────────────────────────────
// Unix socket transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct IpcTransport {
    socket_override: Option<PathBuf>,
    #[cfg(unix)]
    stream: Option<UnixStream>,
}

impl IpcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to one specific socket instead of probing the standard paths.
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_override: Some(path.into()),
            ..Self::default()
        }
    }
}

#[cfg(unix)]
impl IpcTransport {
    fn open_stream(&self) -> Result<UnixStream, TransportError> {
        let candidates = match &self.socket_override {
            Some(path) => vec![path.clone()],
            None => socket_candidates(),
        };

        for path in &candidates {
            if !path.exists() {
                continue;
            }
            match UnixStream::connect(path) {
                Ok(stream) => {
                    tracing::debug!(path = %path.display(), "Connected to Discord IPC socket");
                    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));
                    let _ =
                        stream.set_write_timeout(Some(Duration::from_secs(WRITE_TIMEOUT_SECS)));
                    return Ok(stream);
                }
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "IPC socket refused connection");
                }
            }
        }

        Err(TransportError::Unavailable(
            "no discord-ipc socket accepted a connection (is Discord running?)".to_string(),
        ))
    }

    fn stream(&mut self) -> Result<&mut UnixStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }

    /// Reads frames until one carries a command response, answering pings on
    /// the way. A close frame ends the session.
    fn read_response(&mut self) -> Result<CommandResponse, TransportError> {
        for _ in 0..MAX_INTERLEAVED_FRAMES {
            let stream = self.stream()?;
            let frame = read_frame(stream)?;
            match frame.opcode {
                Opcode::Frame => return Ok(CommandResponse::parse(frame.body)?),
                Opcode::Ping => {
                    write_frame(stream, Opcode::Pong, &frame.body)?;
                }
                Opcode::Pong | Opcode::Handshake => {}
                Opcode::Close => {
                    self.stream = None;
                    let info: Option<ErrorInfo> = serde_json::from_value(frame.body).ok();
                    return Err(match info {
                        Some(info) if info.code != 0 => TransportError::Rejected {
                            code: info.code,
                            message: info.message,
                        },
                        Some(info) => TransportError::Closed(info.message),
                        None => TransportError::Closed("closed by client".to_string()),
                    });
                }
            }
        }
        Err(TransportError::Protocol(
            "too many frames without a response".to_string(),
        ))
    }
}

#[cfg(unix)]
impl Transport for IpcTransport {
    fn login(&mut self, client_id: &str) -> Result<UserIdentity, TransportError> {
        self.close();

        let mut stream = self.open_stream()?;
        write_frame(&mut stream, Opcode::Handshake, &Handshake::new(client_id))?;
        self.stream = Some(stream);

        let response = match self.read_response() {
            Ok(response) => response,
            Err(err) => {
                self.close();
                return Err(err);
            }
        };

        if let Some(info) = response.error_info() {
            self.close();
            return Err(TransportError::Rejected {
                code: info.code,
                message: info.message,
            });
        }
        if !response.is_ready() {
            self.close();
            return Err(TransportError::Protocol(
                "expected READY dispatch after handshake".to_string(),
            ));
        }

        let ready = response.ready_data().map_err(|err| {
            self.close();
            TransportError::from(err)
        })?;

        Ok(UserIdentity {
            id: ready.user.id,
            username: ready.user.username,
            global_name: ready.user.global_name,
        })
    }

    fn set_activity(&mut self, activity: &ActivityPayload) -> Result<(), TransportError> {
        let wire_activity = activity.to_wire();
        wire_activity
            .validate()
            .map_err(|err| TransportError::InvalidPayload(err.to_string()))?;

        let nonce = ulid::Ulid::new().to_string();
        let args = SetActivityArgs {
            pid: std::process::id(),
            activity: Some(&wire_activity),
        };
        let request = CommandRequest {
            cmd: Command::SetActivity,
            args: &args,
            nonce: nonce.clone(),
        };

        let stream = self.stream()?;
        match write_frame(stream, Opcode::Frame, &request) {
            Ok(()) => {}
            // Encoding failed before any byte reached the socket
            Err(err @ (FrameError::TooLarge { .. } | FrameError::InvalidJson(_))) => {
                return Err(TransportError::InvalidPayload(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        for _ in 0..MAX_INTERLEAVED_FRAMES {
            let response = match self.read_response() {
                Ok(response) => response,
                // A close frame mid-request ends the session whatever its code
                Err(TransportError::Rejected { code, message }) if self.stream.is_none() => {
                    return Err(TransportError::Closed(format!("{} ({})", message, code)));
                }
                Err(err) => return Err(err),
            };
            if response.nonce.as_deref() != Some(nonce.as_str()) {
                tracing::debug!(cmd = ?response.cmd, "Skipping unrelated RPC frame");
                continue;
            }
            if let Some(info) = response.error_info() {
                return Err(TransportError::Rejected {
                    code: info.code,
                    message: info.message,
                });
            }
            return Ok(());
        }

        Err(TransportError::Protocol(
            "no response for SET_ACTIVITY".to_string(),
        ))
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        let fd = self.stream()?.as_raw_fd();
        let mut probe = [0u8; 1];
        // SAFETY: `fd` belongs to the stream held in `self.stream` for the
        // duration of this call and `probe` is a valid one byte buffer.
        #[allow(unsafe_code)]
        let peeked = unsafe {
            libc::recv(
                fd,
                probe.as_mut_ptr() as *mut libc::c_void,
                probe.len(),
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };

        if peeked == 0 {
            self.stream = None;
            return Err(TransportError::Closed("socket closed by Discord".to_string()));
        }
        if peeked < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Ok(());
            }
            self.stream = None;
            return Err(TransportError::Closed(err.to_string()));
        }

        // Traffic outside a request is a ping or a close frame
        let stream = self.stream()?;
        let frame = read_frame(stream)?;
        match frame.opcode {
            Opcode::Ping => {
                write_frame(stream, Opcode::Pong, &frame.body)?;
                Ok(())
            }
            Opcode::Close => {
                self.stream = None;
                Err(TransportError::Closed(
                    "Discord closed the session".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = write_frame(&mut stream, Opcode::Close, &serde_json::json!({}));
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

#[cfg(not(unix))]
impl Transport for IpcTransport {
    fn login(&mut self, _client_id: &str) -> Result<UserIdentity, TransportError> {
        Err(TransportError::Unavailable(
            "IPC transport is only implemented for Unix sockets".to_string(),
        ))
    }

    fn set_activity(&mut self, _activity: &ActivityPayload) -> Result<(), TransportError> {
        Err(TransportError::NotOpen)
    }

    fn close(&mut self) {}
}
