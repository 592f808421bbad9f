//! Envelope types for the Huddle protocol.
//!
//! Every frame on the wire is a JSON text frame, except the heartbeat
//! pulse which is the bare string `"p"` in both directions.

use serde::{Deserialize, Serialize};

/// Heartbeat pulse sent by clients, and ping probe sent by the server.
pub const HEARTBEAT: &str = "p";

/// Ping probe bytes written to subscribers by the liveness supervisor.
pub const PING_PROBE: &[u8] = HEARTBEAT.as_bytes();

/// Command tags used in envelopes.
pub mod cmd {
    /// Client asks to join a room.
    pub const JOIN: &str = "join";
    /// Client posts a chat line.
    pub const NEW_MSG: &str = "newmsg";
    /// Server accepted a join.
    pub const JOIN_OK: &str = "joinOK";
    /// Server rejected a session-level request.
    pub const ERROR: &str = "error";
    /// Server pushes a chat message (live or replayed).
    pub const NEW_CHAT_MSG: &str = "newchatmsg";
}

/// Inbound commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand<'a> {
    /// `join`: `data` carries a JSON [`JoinRequest`].
    Join,
    /// `newmsg`: `data` carries the raw chat text.
    NewMessage,
    /// Anything else, kept for logging.
    Unknown(&'a str),
}

/// The base `{cmd, data}` envelope.
///
/// Clients send it for every command, and the server uses the same shape
/// for session-level replies (`joinOK` / `error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Command tag.
    pub cmd: String,
    /// Command payload. Omitted from the JSON when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(cmd: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            data: data.into(),
        }
    }

    /// Create a `join` request envelope.
    #[must_use]
    pub fn join(nic: &str, room: &str) -> Self {
        let request = JoinRequest {
            nic: nic.to_string(),
            room: room.to_string(),
        };
        // Two plain strings always serialize.
        let data = serde_json::to_string(&request).unwrap_or_default();
        Self::new(cmd::JOIN, data)
    }

    /// Create a `newmsg` envelope.
    #[must_use]
    pub fn new_message(text: impl Into<String>) -> Self {
        Self::new(cmd::NEW_MSG, text)
    }

    /// Create a `joinOK` reply.
    #[must_use]
    pub fn join_ok() -> Self {
        Self::new(cmd::JOIN_OK, "")
    }

    /// Create an `error` reply carrying a user-facing message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(cmd::ERROR, message)
    }

    /// Classify the command tag.
    #[must_use]
    pub fn command(&self) -> ClientCommand<'_> {
        match self.cmd.as_str() {
            cmd::JOIN => ClientCommand::Join,
            cmd::NEW_MSG => ClientCommand::NewMessage,
            other => ClientCommand::Unknown(other),
        }
    }
}

/// Payload of a `join` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Requested nickname (display form).
    #[serde(default)]
    pub nic: String,
    /// Target room name.
    #[serde(default)]
    pub room: String,
}

/// A chat message pushed to subscribers, live or from the archive.
///
/// `data` is always escaped and link-decorated before it gets here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Always [`cmd::NEW_CHAT_MSG`].
    pub cmd: String,
    /// Formatted message body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    /// Random correlation id.
    pub id: String,
    /// Emission time, Unix seconds.
    pub timestamp: i64,
    /// Sender display name.
    pub user: String,
}

impl ChatMessage {
    /// Create a new chat message.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        timestamp: i64,
        user: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            cmd: cmd::NEW_CHAT_MSG.to_string(),
            data: data.into(),
            id: id.into(),
            timestamp,
            user: user.into(),
        }
    }
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// The bare `"p"` heartbeat pulse.
    Heartbeat,
    /// A JSON command envelope.
    Command(Envelope),
}
