//! Rooms: roster, broadcast, commands, archive replay and liveness.
//!
//! A room owns its roster behind a short-lived mutex. Every sink write
//! happens outside that lock, in spawned fan-out tasks bounded by the
//! context's write limit. A failed write is treated as a liveness signal:
//! the subscriber is dropped and the rest of the room carries on.

use crate::archive::bucket_name;
use crate::context::ChatContext;
use crate::message::compose;
use crate::nick::{is_long_enough, is_reserved, normalize_nick, SYSTEM_NICK};
use crate::roster::{Roster, Subscriber};
use crate::sink::Sink;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use huddle_protocol::{ProtocolError, PING_PROBE};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Room errors.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Nickname too short.
    #[error("Nickname must be at least 3 chars long")]
    InvalidNickname,

    /// Nickname already in the roster, or reserved.
    #[error("{0} already in chatroom. Choose another nic")]
    NicknameTaken(String),

    /// No subscriber with that nickname.
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),

    /// Envelope serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] ProtocolError),
}

/// Per-room settings supplied when the room is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Persist broadcasts to the room's archive bucket.
    #[serde(default)]
    pub archived: bool,

    /// How many archived messages a new subscriber is sent.
    #[serde(default)]
    pub archive_replay_count: u16,

    /// Liveness probe interval in seconds; 0 disables the supervisor.
    #[serde(default)]
    pub heartbeat_interval_secs: u16,
}

impl RoomConfig {
    /// Heartbeat interval, `None` when disabled.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0)
            .then(|| Duration::from_secs(u64::from(self.heartbeat_interval_secs)))
    }
}

/// A named broadcast group.
pub struct Room {
    name: String,
    roster: Mutex<Roster>,
    /// Archive bucket, set when the room is archived.
    bucket: Option<String>,
    replay_count: usize,
    heartbeat: Option<Duration>,
    ctx: ChatContext,
}

impl Room {
    /// Create a room. The archive bucket must already exist if archiving
    /// is on; see [`Chat::create_room`](crate::Chat::create_room).
    #[must_use]
    pub fn new(name: impl Into<String>, config: RoomConfig, ctx: ChatContext) -> Self {
        let name = name.into();
        Self {
            bucket: config.archived.then(|| bucket_name(&name)),
            replay_count: usize::from(config.archive_replay_count),
            heartbeat: config.heartbeat_interval(),
            roster: Mutex::new(Roster::new()),
            ctx,
            name,
        }
    }

    /// Get the room name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if broadcasts are archived.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.bucket.is_some()
    }

    /// Heartbeat interval, `None` when liveness supervision is off.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat
    }

    /// Number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.roster.lock().len()
    }

    /// Normalized nicks of all subscribers, most recent first.
    #[must_use]
    pub fn subscriber_nicks(&self) -> Vec<String> {
        self.roster.lock().nicks()
    }

    /// Add a subscriber.
    ///
    /// The caller follows up with [`replay_latest`](Self::replay_latest)
    /// and a join announcement.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidNickname`] if the nick is shorter than
    /// three characters, and [`RoomError::NicknameTaken`] if its normalized
    /// form is already present or is the system identity.
    pub fn join(&self, nick: &str, sink: Arc<dyn Sink>) -> Result<(), RoomError> {
        if !is_long_enough(nick) {
            return Err(RoomError::InvalidNickname);
        }
        let normalized = normalize_nick(nick);

        let mut roster = self.roster.lock();
        if is_reserved(&normalized) || roster.contains(&normalized) {
            return Err(RoomError::NicknameTaken(nick.to_string()));
        }
        roster.insert(Subscriber::new(normalized, nick, sink));
        debug!(room = %self.name, nick = %nick, subscribers = roster.len(), "Joined");
        Ok(())
    }

    /// Remove every subscriber matching `nick`, close their sinks, and
    /// announce the departure. Absent nicks are a no-op.
    pub fn leave(self: &Arc<Self>, nick: &str) {
        let removed = self.roster.lock().remove_all(&normalize_nick(nick));
        self.depart(removed);
    }

    /// Like [`leave`](Self::leave), but only when `nick` is still held by
    /// `sink`. Returns whether anything was removed.
    pub fn leave_with(self: &Arc<Self>, nick: &str, sink: &Arc<dyn Sink>) -> bool {
        let normalized = normalize_nick(nick);
        let removed = {
            let mut roster = self.roster.lock();
            let held = roster
                .get(&normalized)
                .is_some_and(|s| Arc::ptr_eq(&s.sink, sink));
            if !held {
                return false;
            }
            roster.remove_all(&normalized)
        };
        self.depart(removed);
        true
    }

    fn depart(self: &Arc<Self>, removed: Vec<Subscriber>) {
        let Some(first) = removed.first() else {
            return;
        };

        for subscriber in &removed {
            subscriber.sink.close();
        }
        debug!(room = %self.name, nick = %first.raw_nick, "Left");

        let notice = format!("{} has left the room", first.raw_nick);
        if let Err(e) = self.broadcast(SYSTEM_NICK, &notice) {
            error!(room = %self.name, error = %e, "Failed to announce departure");
        }
    }

    /// Check if `nick` is subscribed through this exact `sink`.
    #[must_use]
    pub fn holds_sink(&self, nick: &str, sink: &Arc<dyn Sink>) -> bool {
        self.roster
            .lock()
            .get(&normalize_nick(nick))
            .is_some_and(|s| Arc::ptr_eq(&s.sink, sink))
    }

    /// Check if a nick is subscribed (any case, truncated).
    #[must_use]
    pub fn has_subscriber(&self, nick: &str) -> bool {
        self.roster.lock().contains(&normalize_nick(nick))
    }

    /// Look up a subscriber by nick (any case, truncated).
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::SubscriberNotFound`] if absent.
    pub fn get_subscriber(&self, nick: &str) -> Result<Subscriber, RoomError> {
        self.roster
            .lock()
            .get(&normalize_nick(nick))
            .cloned()
            .ok_or_else(|| RoomError::SubscriberNotFound(nick.to_string()))
    }

    /// Format, archive and fan out a message to every subscriber.
    ///
    /// Delivery is best-effort and happens in a background task; only a
    /// serialization failure is reported.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`] if the envelope cannot be
    /// encoded.
    pub fn broadcast(self: &Arc<Self>, from: &str, raw_text: &str) -> Result<(), RoomError> {
        let data = compose(from, raw_text)?;
        self.append_archive(&data);
        self.fan_out(data);
        Ok(())
    }

    /// Format and send a system message to a single subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`] if the envelope cannot be
    /// encoded.
    pub async fn direct_message(
        self: &Arc<Self>,
        nick: &str,
        raw_text: &str,
    ) -> Result<(), RoomError> {
        let data = compose(SYSTEM_NICK, raw_text)?;
        let Ok(subscriber) = self.get_subscriber(nick) else {
            self.leave(nick);
            return Ok(());
        };
        if let Err(e) = subscriber.sink.send(data).await {
            warn!(room = %self.name, nick = %subscriber.nick, error = %e, "Direct message failed");
            self.leave(&subscriber.nick);
        }
        Ok(())
    }

    /// Handle a chat line from `from`: a `/command` or a message for
    /// everyone. Blank input is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an outgoing envelope cannot be encoded.
    pub async fn handle_incoming(
        self: &Arc<Self>,
        from: &str,
        raw_text: &str,
    ) -> Result<(), RoomError> {
        let text = raw_text.trim();
        if text.is_empty() {
            trace!(room = %self.name, nick = %from, "Ignoring empty message");
            return Ok(());
        }

        if !text.starts_with('/') {
            return self.broadcast(from, text);
        }

        let command = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        debug!(room = %self.name, nick = %from, command = %command, "Command received");

        match command.as_str() {
            "/me" => self.broadcast(SYSTEM_NICK, from),
            "/users" => {
                self.direct_message(from, "Users list:").await?;
                let requester = normalize_nick(from);
                for nick in self.subscriber_nicks() {
                    if nick != requester {
                        self.direct_message(from, &nick).await?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Write pre-serialized bytes to every current subscriber.
    fn fan_out(self: &Arc<Self>, data: Bytes) {
        let members = self.roster.lock().snapshot();
        if members.is_empty() {
            return;
        }
        trace!(room = %self.name, recipients = members.len(), "Fan-out");

        let room = Arc::clone(self);
        let limit = self.ctx.max_concurrent_writes;
        tokio::spawn(async move {
            stream::iter(members)
                .for_each_concurrent(limit, |subscriber| {
                    let room = Arc::clone(&room);
                    let data = data.clone();
                    async move {
                        if let Err(e) = subscriber.sink.send(data).await {
                            warn!(
                                room = %room.name,
                                nick = %subscriber.nick,
                                error = %e,
                                "Delivery failed, dropping subscriber"
                            );
                            room.leave(&subscriber.nick);
                        }
                    }
                })
                .await;
        });
    }

    /// Persist a serialized message. Failures are logged, never returned.
    pub fn append_archive(&self, record: &[u8]) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        if let Err(e) = self.ctx.archive.append(bucket, record) {
            error!(room = %self.name, error = %e, "Unable to save archive");
        }
    }

    /// Send the most recent archived messages, oldest first, straight to
    /// one subscriber.
    pub async fn replay_latest(self: &Arc<Self>, nick: &str) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        if self.replay_count == 0 {
            return;
        }
        let Ok(subscriber) = self.get_subscriber(nick) else {
            return;
        };

        let records = match self.ctx.archive.latest(bucket, self.replay_count) {
            Ok(records) => records,
            Err(e) => {
                error!(room = %self.name, error = %e, "Unable to read archive");
                return;
            }
        };
        debug!(room = %self.name, nick = %subscriber.nick, count = records.len(), "Replaying archive");

        for record in records {
            if let Err(e) = subscriber.sink.send(record).await {
                warn!(room = %self.name, nick = %subscriber.nick, error = %e, "Replay failed");
                self.leave(&subscriber.nick);
                return;
            }
        }
    }

    /// Record a heartbeat pulse. An unknown nick is unsubscribed.
    pub fn beat_received_from(self: &Arc<Self>, nick: &str) {
        let normalized = normalize_nick(nick);
        let found = self.roster.lock().touch(&normalized, Instant::now());
        if found {
            trace!(room = %self.name, nick = %normalized, "Beat received");
        } else {
            warn!(room = %self.name, nick = %nick, "Beat from unknown subscriber");
            self.leave(nick);
        }
    }

    /// Start the liveness supervisor. Returns `None` when heartbeats are
    /// disabled for this room.
    ///
    /// The task holds a weak reference and stops once the room is gone.
    pub fn spawn_supervisor(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.heartbeat?;
        let weak: Weak<Self> = Arc::downgrade(self);
        info!(room = %self.name, interval = ?period, "Starting liveness supervisor");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(room) = weak.upgrade() else {
                    break;
                };
                room.supervise_once().await;
            }
        }))
    }

    /// Run one probe sweep: ping every subscriber and evict those whose
    /// last beat is older than twice the heartbeat interval.
    pub async fn supervise_once(self: &Arc<Self>) {
        let Some(period) = self.heartbeat else {
            return;
        };
        let max_silence = period * 2;
        let members = self.roster.lock().snapshot();
        let now = Instant::now();
        let ping = Bytes::from_static(PING_PROBE);

        stream::iter(members)
            .for_each_concurrent(self.ctx.max_concurrent_writes, |subscriber| {
                let ping = ping.clone();
                async move {
                    trace!(room = %self.name, nick = %subscriber.nick, "Ping");
                    if let Err(e) = subscriber.sink.send(ping).await {
                        warn!(room = %self.name, nick = %subscriber.nick, error = %e, "Ping failed");
                        self.leave(&subscriber.nick);
                        return;
                    }
                    if subscriber.is_silent(now, max_silence) {
                        info!(room = %self.name, nick = %subscriber.nick, "No heartbeat, subscriber is dead");
                        self.leave(&subscriber.nick);
                    }
                }
            })
            .await;
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .field("bucket", &self.bucket)
            .field("replay_count", &self.replay_count)
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::sink::{ChannelSink, SinkError, SinkReceiver};
    use async_trait::async_trait;
    use huddle_protocol::codec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink whose writes always fail.
    #[derive(Default)]
    struct BrokenSink {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl Sink for BrokenSink {
        async fn send(&self, _data: Bytes) -> Result<(), SinkError> {
            Err(SinkError::SendFailed("broken pipe".into()))
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }
    }

    fn room(config: RoomConfig) -> Arc<Room> {
        let ctx = ChatContext::in_memory();
        if config.archived {
            ctx.archive.create_bucket(&bucket_name("lobby")).unwrap();
        }
        Arc::new(Room::new("lobby", config, ctx))
    }

    fn channel() -> (Arc<dyn Sink>, SinkReceiver) {
        let (sink, rx) = ChannelSink::new();
        (Arc::new(sink), rx)
    }

    async fn next_chat(rx: &mut SinkReceiver) -> huddle_protocol::ChatMessage {
        let bytes = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("sink closed");
        codec::decode_chat(&bytes).unwrap()
    }

    async fn assert_silent(rx: &mut SinkReceiver) {
        let res = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(res.is_err(), "expected no message, got {:?}", res);
    }

    async fn wait_until_gone(room: &Room, nick: &str) {
        for _ in 0..100 {
            if !room.has_subscriber(nick) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{nick} still subscribed");
    }

    #[tokio::test]
    async fn test_join_validates_nick() {
        let room = room(RoomConfig::default());
        let (sink, _rx) = channel();

        assert!(matches!(
            room.join("ab", Arc::clone(&sink)),
            Err(RoomError::InvalidNickname)
        ));
        assert_eq!(room.subscriber_count(), 0);

        for reserved in ["chatbot", "ChatBot", "CHATBOT"] {
            assert!(matches!(
                room.join(reserved, Arc::clone(&sink)),
                Err(RoomError::NicknameTaken(_))
            ));
        }
        assert_eq!(room.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_join_rejects_taken_nick_case_and_truncation() {
        let room = room(RoomConfig::default());
        let (a, _ra) = channel();
        let (b, _rb) = channel();
        let (c, _rc) = channel();

        room.join("AlexanderTheGreat", a).unwrap();
        assert!(room.has_subscriber("alexanderthegreat"));
        assert!(room.has_subscriber("ALEXANDERT"));
        assert!(matches!(
            room.join("alexandertXYZ", b),
            Err(RoomError::NicknameTaken(_))
        ));

        room.join("Bob", c).unwrap();
        assert_eq!(room.subscriber_nicks(), vec!["bob", "alexandert"]);
        assert_eq!(room.get_subscriber("BOB").unwrap().raw_nick, "Bob");
        assert!(matches!(
            room.get_subscriber("carol"),
            Err(RoomError::SubscriberNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_escaped() {
        let room = room(RoomConfig::default());
        let (a, mut ra) = channel();
        let (b, mut rb) = channel();
        room.join("alice", a).unwrap();
        room.join("bob", b).unwrap();

        room.broadcast("alice", "<script>hi</script>").unwrap();

        for rx in [&mut ra, &mut rb] {
            let msg = next_chat(rx).await;
            assert_eq!(msg.user, "alice");
            assert!(!msg.data.contains("<script>"));
            assert_eq!(msg.data, "&lt;script&gt;hi&lt;/script&gt;");
        }
    }

    #[tokio::test]
    async fn test_leave_closes_sink_and_announces() {
        let room = room(RoomConfig::default());
        let (a, mut ra) = channel();
        let (b, mut rb) = channel();
        room.join("Alice", a).unwrap();
        room.join("bob", b).unwrap();

        room.leave("ALICE");
        assert!(!room.has_subscriber("alice"));
        assert!(ra.recv().await.is_none());

        let msg = next_chat(&mut rb).await;
        assert_eq!(msg.user, SYSTEM_NICK);
        assert_eq!(msg.data, "Alice has left the room");
    }

    #[tokio::test]
    async fn test_leave_absent_is_silent_noop() {
        let room = room(RoomConfig::default());
        let (b, mut rb) = channel();
        room.join("bob", b).unwrap();

        room.leave("alice");
        room.leave("alice");
        assert_silent(&mut rb).await;
        assert!(room.has_subscriber("bob"));
    }

    #[tokio::test]
    async fn test_failed_delivery_drops_only_that_subscriber() {
        let room = room(RoomConfig::default());
        let broken = Arc::new(BrokenSink::default());
        let (b, mut rb) = channel();
        room.join("ghost", Arc::clone(&broken) as Arc<dyn Sink>).unwrap();
        room.join("bob", b).unwrap();

        room.broadcast("bob", "hello").unwrap();

        let mut bodies = vec![next_chat(&mut rb).await.data, next_chat(&mut rb).await.data];
        bodies.sort();
        assert_eq!(bodies, vec!["ghost has left the room", "hello"]);

        wait_until_gone(&room, "ghost").await;
        assert!(broken.is_closed());
        assert!(room.has_subscriber("bob"));
    }

    #[tokio::test]
    async fn test_empty_message_is_noop() {
        let room = room(RoomConfig::default());
        let (b, mut rb) = channel();
        room.join("bob", b).unwrap();

        room.handle_incoming("bob", "   ").await.unwrap();
        room.handle_incoming("bob", "").await.unwrap();
        assert_silent(&mut rb).await;
    }

    #[tokio::test]
    async fn test_plain_message_is_trimmed_and_broadcast() {
        let room = room(RoomConfig::default());
        let (b, mut rb) = channel();
        room.join("bob", b).unwrap();

        room.handle_incoming("bob", "  visit example.com now \n").await.unwrap();
        let msg = next_chat(&mut rb).await;
        assert_eq!(msg.user, "bob");
        assert_eq!(
            msg.data,
            r#"visit <a href="http://example.com" target="_blank">example.com</a> now"#
        );
    }

    #[tokio::test]
    async fn test_me_command() {
        let room = room(RoomConfig::default());
        let (b, mut rb) = channel();
        room.join("Bobby", b).unwrap();

        room.handle_incoming("Bobby", "/me").await.unwrap();
        let msg = next_chat(&mut rb).await;
        assert_eq!(msg.user, SYSTEM_NICK);
        assert_eq!(msg.data, "Bobby");
    }

    #[tokio::test]
    async fn test_users_command_lists_others() {
        let room = room(RoomConfig::default());
        let (a, mut ra) = channel();
        let (b, mut rb) = channel();
        let (c, _rc) = channel();
        room.join("alice", a).unwrap();
        room.join("Bob", b).unwrap();
        room.join("carol", c).unwrap();

        room.handle_incoming("Bob", "/USERS please").await.unwrap();

        assert_eq!(next_chat(&mut rb).await.data, "Users list:");
        assert_eq!(next_chat(&mut rb).await.data, "carol");
        assert_eq!(next_chat(&mut rb).await.data, "alice");
        assert_silent(&mut rb).await;
        assert_silent(&mut ra).await;
    }

    #[tokio::test]
    async fn test_unknown_command_ignored() {
        let room = room(RoomConfig::default());
        let (b, mut rb) = channel();
        room.join("bob", b).unwrap();

        room.handle_incoming("bob", "/shrug").await.unwrap();
        assert_silent(&mut rb).await;
    }

    #[tokio::test]
    async fn test_direct_message_to_absent_is_ok() {
        let room = room(RoomConfig::default());
        room.direct_message("nobody", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_latest_in_order() {
        let room = room(RoomConfig {
            archived: true,
            archive_replay_count: 2,
            heartbeat_interval_secs: 0,
        });
        for body in ["a", "b", "c"] {
            room.broadcast("alice", body).unwrap();
        }

        let (d, mut rd) = channel();
        room.join("dave", d).unwrap();
        room.replay_latest("dave").await;

        assert_eq!(next_chat(&mut rd).await.data, "b");
        assert_eq!(next_chat(&mut rd).await.data, "c");
        assert_silent(&mut rd).await;
    }

    #[tokio::test]
    async fn test_replay_skipped_when_not_archived() {
        let archive = Arc::new(MemoryArchive::new());
        let ctx = ChatContext::new(archive.clone());
        let room = Arc::new(Room::new("quiet", RoomConfig::default(), ctx));
        room.broadcast("alice", "a").unwrap();
        assert!(archive.is_empty("quiet_arch"));

        let (d, mut rd) = channel();
        room.join("dave", d).unwrap();
        room.replay_latest("dave").await;
        assert_silent(&mut rd).await;
    }

    #[tokio::test]
    async fn test_beat_from_unknown_is_harmless() {
        let room = room(RoomConfig::default());
        let (b, mut rb) = channel();
        room.join("bob", b).unwrap();

        room.beat_received_from("ghost");
        assert!(room.has_subscriber("bob"));
        assert_silent(&mut rb).await;
    }

    #[tokio::test]
    async fn test_no_supervisor_without_heartbeat() {
        let room = room(RoomConfig::default());
        assert!(room.spawn_supervisor().is_none());
    }

    fn heartbeat_room(secs: u16) -> Arc<Room> {
        room(RoomConfig {
            archived: false,
            archive_replay_count: 0,
            heartbeat_interval_secs: secs,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_subscriber_is_evicted() {
        let room = heartbeat_room(1);
        let (a, mut ra) = channel();
        room.join("alice", a).unwrap();
        room.beat_received_from("alice");

        tokio::time::advance(Duration::from_millis(2_500)).await;
        room.supervise_once().await;

        assert!(!room.has_subscriber("alice"));
        assert_eq!(ra.recv().await.unwrap(), Bytes::from_static(PING_PROBE));
        assert!(ra.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_beat_survives() {
        let room = heartbeat_room(1);
        let (a, _ra) = channel();
        room.join("alice", a).unwrap();

        tokio::time::advance(Duration::from_millis(1_500)).await;
        room.beat_received_from("alice");
        tokio::time::advance(Duration::from_millis(1_500)).await;
        room.supervise_once().await;

        assert!(room.has_subscriber("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_beating_subscriber_is_kept() {
        let room = heartbeat_room(1);
        let (a, mut ra) = channel();
        room.join("alice", a).unwrap();

        tokio::time::advance(Duration::from_secs(3_600)).await;
        room.supervise_once().await;

        assert!(room.has_subscriber("alice"));
        assert_eq!(ra.recv().await.unwrap(), Bytes::from_static(PING_PROBE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ping_evicts() {
        let room = heartbeat_room(1);
        room.join("ghost", Arc::new(BrokenSink::default())).unwrap();

        room.supervise_once().await;
        assert!(!room.has_subscriber("ghost"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_reader_is_evicted() {
        let room = heartbeat_room(1);
        let (stalled, _never_drained) = ChannelSink::with_capacity(1);
        room.join("sloth", Arc::new(stalled)).unwrap();

        room.supervise_once().await;
        assert!(room.has_subscriber("sloth"));

        room.supervise_once().await;
        assert!(!room.has_subscriber("sloth"));
    }

    #[tokio::test]
    async fn test_leave_with_only_removes_matching_sink() {
        let room = room(RoomConfig::default());
        let (old, _ro) = channel();
        let (new, _rn) = channel();

        room.join("alice", Arc::clone(&old)).unwrap();
        assert!(room.holds_sink("ALICE", &old));
        room.leave("alice");
        room.join("alice", Arc::clone(&new)).unwrap();

        assert!(!room.holds_sink("alice", &old));
        assert!(!room.leave_with("alice", &old));
        assert!(room.has_subscriber("alice"));

        assert!(room.leave_with("alice", &new));
        assert!(!room.has_subscriber("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_runs_on_interval() {
        let room = heartbeat_room(1);
        room.join("ghost", Arc::new(BrokenSink::default())).unwrap();
        let (b, mut rb) = channel();
        room.join("bob", b).unwrap();

        let handle = room.spawn_supervisor().unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert!(!room.has_subscriber("ghost"));
        assert!(room.has_subscriber("bob"));
        assert_eq!(rb.recv().await.unwrap(), Bytes::from_static(PING_PROBE));
        handle.abort();
    }
}
