//! Codec for encoding and decoding Huddle envelopes.
//!
//! Frames are JSON text. The heartbeat pulse is recognized before any
//! JSON parsing happens.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::frames::{ChatMessage, ClientFrame, Envelope, JoinRequest, HEARTBEAT};

/// Maximum inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode any envelope to bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Encode a session-level reply (`joinOK` / `error`).
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_reply(reply: &Envelope) -> Result<Bytes, ProtocolError> {
    encode(reply)
}

/// Encode a chat message.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_chat(message: &ChatMessage) -> Result<Bytes, ProtocolError> {
    encode(message)
}

/// Decode one client text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a valid envelope.
pub fn decode_frame(text: &str) -> Result<ClientFrame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    if text == HEARTBEAT {
        return Ok(ClientFrame::Heartbeat);
    }
    let envelope: Envelope = serde_json::from_str(text)?;
    Ok(ClientFrame::Command(envelope))
}

/// Decode the `data` field of a `join` command.
///
/// # Errors
///
/// Returns an error if `data` is not a JSON join request.
pub fn decode_join(data: &str) -> Result<JoinRequest, ProtocolError> {
    Ok(serde_json::from_str(data)?)
}

/// Decode a chat message pushed by the server.
///
/// # Errors
///
/// Returns an error if the bytes are not a chat message.
pub fn decode_chat(data: &[u8]) -> Result<ChatMessage, ProtocolError> {
    Ok(serde_json::from_slice(data)?)
}

/// Decode a session-level reply pushed by the server.
///
/// # Errors
///
/// Returns an error if the bytes are not an envelope.
pub fn decode_reply(data: &[u8]) -> Result<Envelope, ProtocolError> {
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ClientCommand;

    #[test]
    fn test_heartbeat_is_not_json() {
        assert_eq!(decode_frame("p").unwrap(), ClientFrame::Heartbeat);
    }

    #[test]
    fn test_decode_join_command() {
        let frame = decode_frame(r#"{"cmd":"join","data":"{\"nic\":\"bob\",\"room\":\"lobby\"}"}"#)
            .unwrap();
        let ClientFrame::Command(env) = frame else {
            panic!("expected command frame");
        };
        assert_eq!(env.command(), ClientCommand::Join);

        let req = decode_join(&env.data).unwrap();
        assert_eq!(req.nic, "bob");
        assert_eq!(req.room, "lobby");
    }

    #[test]
    fn test_missing_data_defaults_to_empty() {
        let ClientFrame::Command(env) = decode_frame(r#"{"cmd":"newmsg"}"#).unwrap() else {
            panic!("expected command frame");
        };
        assert_eq!(env.data, "");
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_frame("pp"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode_join("not json"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_frame_too_large() {
        let big = "x".repeat(MAX_FRAME_SIZE + 1);
        match decode_frame(&big) {
            Err(ProtocolError::FrameTooLarge(n)) => assert_eq!(n, MAX_FRAME_SIZE + 1),
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_reply_bytes() {
        let bytes = encode_reply(&Envelope::error("lobby doesn't exists")).unwrap();
        assert_eq!(
            &bytes[..],
            br#"{"cmd":"error","data":"lobby doesn't exists"}"#
        );
    }
}
