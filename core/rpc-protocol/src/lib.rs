//! Wire types and frame codec for the Discord local RPC socket.
//!
//! The desktop client listens on `discord-ipc-N`. Every message is a frame: a
//! little-endian `u32` opcode, a little-endian `u32` body length, then a JSON
//! body. This crate is shared by the session core and its tests so the payload
//! shape cannot drift between the two.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};

pub const PROTOCOL_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 8;
pub const MAX_FRAME_BYTES: usize = 64 * 1024;
pub const MAX_BUTTONS: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error on RPC socket: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u32),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("Frame body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl FrameError {
    /// True when the socket itself is gone (EOF, reset, broken pipe).
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl Opcode {
    pub fn from_u32(value: u32) -> Result<Self, FrameError> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub opcode: Opcode,
    pub body: Value,
}

pub fn write_frame<W, T>(writer: &mut W, opcode: Opcode, body: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(body)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let mut buffer = Vec::with_capacity(HEADER_LEN + payload.len());
    buffer.extend_from_slice(&(opcode as u32).to_le_bytes());
    buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&payload);
    writer.write_all(&buffer)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;

    let opcode = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let opcode = Opcode::from_u32(opcode)?;

    if len > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let body = if body.iter().all(|b| b.is_ascii_whitespace()) {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };

    Ok(Frame { opcode, body })
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Handshake {
    pub v: u32,
    pub client_id: String,
}

impl Handshake {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            client_id: client_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Dispatch,
    SetActivity,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Ready,
    Error,
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
pub struct CommandRequest<'a, T: Serialize> {
    pub cmd: Command,
    pub args: &'a T,
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandResponse {
    pub cmd: Command,
    #[serde(default)]
    pub evt: Option<Event>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl CommandResponse {
    pub fn parse(body: Value) -> Result<Self, FrameError> {
        Ok(serde_json::from_value(body)?)
    }

    pub fn is_ready(&self) -> bool {
        self.cmd == Command::Dispatch && self.evt == Some(Event::Ready)
    }

    /// Returns the error details when the client answered with `evt: ERROR`.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        if self.evt != Some(Event::Error) {
            return None;
        }
        let info = self
            .data
            .clone()
            .and_then(|data| serde_json::from_value(data).ok())
            .unwrap_or_else(|| ErrorInfo::new(0, "unknown RPC error"));
        Some(info)
    }

    pub fn ready_data(&self) -> Result<ReadyData, FrameError> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| FrameError::InvalidPayload("READY dispatch without data".into()))?;
        Ok(serde_json::from_value(data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Body of a Close frame (`{"code": 4000, "message": "Invalid Client ID"}`).
pub type CloseInfo = ErrorInfo;

#[derive(Debug, Clone, Deserialize)]
pub struct ReadyData {
    #[serde(default)]
    pub v: Option<u32>,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Activity
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SetActivityArgs<'a> {
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<&'a Activity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Assets>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub instance: bool,
}

impl Activity {
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.buttons.len() > MAX_BUTTONS {
            return Err(FrameError::InvalidPayload(format!(
                "at most {} buttons are allowed",
                MAX_BUTTONS
            )));
        }
        for button in &self.buttons {
            if button.label.trim().is_empty() || button.url.trim().is_empty() {
                return Err(FrameError::InvalidPayload(
                    "buttons require both label and url".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

impl Assets {
    pub fn is_empty(&self) -> bool {
        self.large_image.is_none()
            && self.large_text.is_none()
            && self.small_image.is_none()
            && self.small_text.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub url: String,
}
