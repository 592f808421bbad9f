//! Outgoing chat message construction.
//!
//! Every message leaving a room goes through [`compose`]: the body is
//! formatted, wrapped in a `newchatmsg` envelope with a fresh correlation
//! id and timestamp, then serialized once and shared by all recipients.

use crate::format::format_message;
use bytes::Bytes;
use huddle_protocol::{codec, ChatMessage, ProtocolError};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a random correlation id.
#[must_use]
pub fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Build a chat message from raw user text.
#[must_use]
pub fn chat_message(from: &str, raw_text: &str) -> ChatMessage {
    ChatMessage::new(
        correlation_id(),
        unix_timestamp(),
        from,
        format_message(raw_text),
    )
}

/// Build and serialize a chat message from raw user text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn compose(from: &str, raw_text: &str) -> Result<Bytes, ProtocolError> {
    codec::encode_chat(&chat_message(from, raw_text))
}
