//! # huddle-protocol
//!
//! Wire envelopes for the Huddle room chat engine.
//!
//! Clients speak JSON text frames over a WebSocket:
//!
//! - `{"cmd":"join","data":"{\"nic\":..,\"room\":..}"}` - join a room
//! - `{"cmd":"newmsg","data":"hello"}` - post a chat line (or a `/command`)
//! - `p` - heartbeat pulse
//!
//! The server answers with `joinOK` / `error` replies and `newchatmsg`
//! chat messages, and probes liveness with the same bare `p`.
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ClientFrame, Envelope};
//!
//! let frame = codec::decode_frame(r#"{"cmd":"newmsg","data":"hi"}"#).unwrap();
//! assert_eq!(frame, ClientFrame::Command(Envelope::new_message("hi")));
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode_frame, encode, ProtocolError};
pub use frames::{
    cmd, ChatMessage, ClientCommand, ClientFrame, Envelope, JoinRequest, HEARTBEAT, PING_PROBE,
};
