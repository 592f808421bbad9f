//! Per-connection dispatcher.
//!
//! The transport creates one [`Session`] per connection and feeds it every
//! decoded text frame. A session joins at most one room; once joined, chat
//! lines and heartbeats are routed to that room.

use crate::chat::{Chat, ChatError};
use crate::nick::SYSTEM_NICK;
use crate::room::Room;
use crate::sink::Sink;
use huddle_protocol::{codec, ClientCommand, ClientFrame, Envelope, JoinRequest};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Reply sent when a join payload cannot be understood.
const INTERNAL_ERROR: &str = "internal server error";

/// State of one transport connection.
pub struct Session {
    chat: Arc<Chat>,
    sink: Arc<dyn Sink>,
    membership: Option<Membership>,
}

struct Membership {
    nick: String,
    room: Arc<Room>,
}

impl Session {
    /// Create a session writing to `sink`.
    #[must_use]
    pub fn new(chat: Arc<Chat>, sink: Arc<dyn Sink>) -> Self {
        Self {
            chat,
            sink,
            membership: None,
        }
    }

    /// Nickname this session joined with.
    #[must_use]
    pub fn nick(&self) -> Option<&str> {
        self.membership.as_ref().map(|m| m.nick.as_str())
    }

    /// Room this session joined.
    #[must_use]
    pub fn room(&self) -> Option<&Arc<Room>> {
        self.membership.as_ref().map(|m| &m.room)
    }

    /// Handle one inbound text frame.
    pub async fn handle_frame(&mut self, text: &str) {
        let envelope = match codec::decode_frame(text) {
            Ok(ClientFrame::Heartbeat) => {
                match self.membership() {
                    Some(m) => m.room.beat_received_from(&m.nick),
                    None => trace!("Heartbeat before join, ignored"),
                }
                return;
            }
            Ok(ClientFrame::Command(envelope)) => envelope,
            Err(e) => {
                error!(error = %e, "Unable to decode message from client");
                return;
            }
        };
        trace!(frame = %text, "->");

        match envelope.command() {
            ClientCommand::Join => self.handle_join(&envelope.data).await,
            ClientCommand::NewMessage => {
                let Some(m) = self.membership() else {
                    debug!("Message outside a room, ignored");
                    return;
                };
                if let Err(e) = m.room.handle_incoming(&m.nick, &envelope.data).await {
                    error!(room = %m.room.name(), nick = %m.nick, error = %e, "Message handling error");
                }
            }
            ClientCommand::Unknown(cmd) => {
                info!(cmd = %cmd, "Unimplemented command, ignored");
            }
        }
    }

    async fn handle_join(&mut self, data: &str) {
        let JoinRequest { nic, room: room_name } = match codec::decode_join(data) {
            Ok(request) => request,
            Err(e) => {
                error!(data = %data, error = %e, "Unable to decode join request");
                self.reply(Envelope::error(INTERNAL_ERROR)).await;
                return;
            }
        };

        if let Some(m) = self.membership() {
            warn!(nick = %m.nick, room = %m.room.name(), "Second join on one connection");
            let message = format!("already joined room {}", m.room.name());
            self.reply(Envelope::error(message)).await;
            return;
        }

        let room = match self.chat.get_room(&room_name) {
            Ok(room) => room,
            Err(e @ ChatError::RoomNotFound(_)) => {
                warn!(nick = %nic, room = %room_name, "Join to unknown room");
                self.reply(Envelope::error(e.to_string())).await;
                return;
            }
            Err(e) => {
                error!(nick = %nic, room = %room_name, error = %e, "Room lookup failed");
                self.reply(Envelope::error(INTERNAL_ERROR)).await;
                return;
            }
        };

        if let Err(e) = room.join(&nic, Arc::clone(&self.sink)) {
            warn!(nick = %nic, room = %room_name, error = %e, "Join rejected");
            let message = format!("Unable to join room {} {}", room.name(), e);
            self.reply(Envelope::error(message)).await;
            return;
        }

        self.reply(Envelope::join_ok()).await;
        info!(nick = %nic, room = %room.name(), "Joined room");

        room.replay_latest(&nic).await;
        let notice = format!("{nic} has joined the room");
        if let Err(e) = room.broadcast(SYSTEM_NICK, &notice) {
            error!(room = %room.name(), error = %e, "Failed to announce join");
        }

        self.membership = Some(Membership { nick: nic, room });
    }

    /// Leave the joined room, if any. Called when the connection ends.
    ///
    /// A nick that has since been taken over by another connection is
    /// left alone.
    pub fn close(&mut self) {
        if let Some(m) = self.membership.take() {
            if m.room.leave_with(&m.nick, &self.sink) {
                info!(nick = %m.nick, room = %m.room.name(), "Left room on disconnect");
            }
        }
    }

    /// Current membership. Dropped once the room has removed this
    /// connection's subscriber (eviction, failed write).
    fn membership(&mut self) -> Option<&Membership> {
        let live = self
            .membership
            .as_ref()
            .is_some_and(|m| m.room.holds_sink(&m.nick, &self.sink));
        if !live {
            if let Some(m) = self.membership.take() {
                debug!(nick = %m.nick, room = %m.room.name(), "Membership ended by room");
            }
        }
        self.membership.as_ref()
    }

    async fn reply(&self, envelope: Envelope) {
        let data = match codec::encode_reply(&envelope) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "Failed to encode reply");
                return;
            }
        };
        if let Err(e) = self.sink.send(data).await {
            debug!(error = %e, "Reply not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChatContext;
    use crate::room::RoomConfig;
    use crate::sink::{ChannelSink, SinkReceiver};
    use std::time::Duration;

    fn chat() -> Arc<Chat> {
        let chat = Chat::new(ChatContext::in_memory());
        chat.create_room("lobby", RoomConfig::default()).unwrap();
        Arc::new(chat)
    }

    fn session(chat: &Arc<Chat>) -> (Session, SinkReceiver) {
        let (sink, rx) = ChannelSink::new();
        (Session::new(Arc::clone(chat), Arc::new(sink)), rx)
    }

    async fn next_reply(rx: &mut SinkReceiver) -> Envelope {
        let bytes = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        codec::decode_reply(&bytes).unwrap()
    }

    fn join_frame(nic: &str, room: &str) -> String {
        serde_json::to_string(&Envelope::join(nic, room)).unwrap()
    }

    #[tokio::test]
    async fn test_join_ok() {
        let chat = chat();
        let (mut s, mut rx) = session(&chat);

        s.handle_frame(&join_frame("alice", "lobby")).await;
        assert_eq!(next_reply(&mut rx).await, Envelope::join_ok());
        assert_eq!(s.nick(), Some("alice"));
        assert_eq!(s.room().unwrap().name(), "lobby");
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let chat = chat();
        let (mut s, mut rx) = session(&chat);

        s.handle_frame(&join_frame("alice", "kitchen")).await;
        assert_eq!(
            next_reply(&mut rx).await,
            Envelope::error("kitchen doesn't exists")
        );
        assert!(s.nick().is_none());
    }

    #[tokio::test]
    async fn test_join_bad_payload() {
        let chat = chat();
        let (mut s, mut rx) = session(&chat);

        s.handle_frame(r#"{"cmd":"join","data":"nope"}"#).await;
        assert_eq!(next_reply(&mut rx).await, Envelope::error(INTERNAL_ERROR));
    }

    #[tokio::test]
    async fn test_join_short_nick() {
        let chat = chat();
        let (mut s, mut rx) = session(&chat);

        s.handle_frame(&join_frame("al", "lobby")).await;
        assert_eq!(
            next_reply(&mut rx).await,
            Envelope::error("Unable to join room lobby Nickname must be at least 3 chars long")
        );
    }

    #[tokio::test]
    async fn test_second_join_rejected() {
        let chat = chat();
        let (mut s, mut rx) = session(&chat);

        s.handle_frame(&join_frame("alice", "lobby")).await;
        assert_eq!(next_reply(&mut rx).await, Envelope::join_ok());
        // own join announcement
        rx.recv().await.unwrap();

        s.handle_frame(&join_frame("alice2", "lobby")).await;
        assert_eq!(
            next_reply(&mut rx).await,
            Envelope::error("already joined room lobby")
        );
        assert!(!chat.get_room("lobby").unwrap().has_subscriber("alice2"));
    }

    #[tokio::test]
    async fn test_frames_before_join_are_ignored() {
        let chat = chat();
        let (mut s, mut rx) = session(&chat);

        s.handle_frame("p").await;
        s.handle_frame(r#"{"cmd":"newmsg","data":"hello"}"#).await;
        s.handle_frame(r#"{"cmd":"typing"}"#).await;
        s.handle_frame("garbage").await;

        let res = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_evicted_session_forgets_room() {
        let chat = chat();
        let (mut s, mut rx) = session(&chat);

        s.handle_frame(&join_frame("alice", "lobby")).await;
        assert_eq!(next_reply(&mut rx).await, Envelope::join_ok());
        let room = chat.get_room("lobby").unwrap();
        room.leave("alice");

        s.handle_frame(r#"{"cmd":"newmsg","data":"still here?"}"#).await;
        assert!(s.nick().is_none());
        assert!(s.room().is_none());
        assert!(!room.has_subscriber("alice"));
    }

    #[tokio::test]
    async fn test_close_leaves_room() {
        let chat = chat();
        let (mut s, _rx) = session(&chat);

        s.handle_frame(&join_frame("alice", "lobby")).await;
        let room = chat.get_room("lobby").unwrap();
        assert!(room.has_subscriber("alice"));

        s.close();
        assert!(!room.has_subscriber("alice"));
        assert!(s.nick().is_none());
    }
}
