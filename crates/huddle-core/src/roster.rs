//! Per-room subscriber roster.
//!
//! The roster is a plain list ordered most-recent-first. It does no
//! locking and no I/O; the owning [`Room`](crate::Room) guards it and does
//! all sink writes outside the lock.

use crate::sink::Sink;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// A connected identity in one room.
#[derive(Clone)]
pub struct Subscriber {
    /// Normalized nickname, the roster key.
    pub nick: String,
    /// Nickname as the user typed it, for display.
    pub raw_nick: String,
    /// Outbound byte channel.
    pub sink: Arc<dyn Sink>,
    /// Last heartbeat pulse; `None` until the first one arrives.
    pub last_beat: Option<Instant>,
}

impl Subscriber {
    /// Create a subscriber that has never sent a heartbeat.
    #[must_use]
    pub fn new(nick: impl Into<String>, raw_nick: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        Self {
            nick: nick.into(),
            raw_nick: raw_nick.into(),
            sink,
            last_beat: None,
        }
    }

    /// Check if the last heartbeat is older than `max_silence`.
    ///
    /// A subscriber that never sent a heartbeat is never silent.
    #[must_use]
    pub fn is_silent(&self, now: Instant, max_silence: std::time::Duration) -> bool {
        self.last_beat
            .is_some_and(|beat| now.saturating_duration_since(beat) > max_silence)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("nick", &self.nick)
            .field("raw_nick", &self.raw_nick)
            .field("last_beat", &self.last_beat)
            .finish_non_exhaustive()
    }
}

/// The live subscribers of one room.
#[derive(Debug, Default)]
pub struct Roster {
    members: Vec<Subscriber>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a normalized nick is present.
    #[must_use]
    pub fn contains(&self, nick: &str) -> bool {
        self.members.iter().any(|s| s.nick == nick)
    }

    /// Get the first subscriber with a normalized nick.
    #[must_use]
    pub fn get(&self, nick: &str) -> Option<&Subscriber> {
        self.members.iter().find(|s| s.nick == nick)
    }

    /// Insert at the front.
    pub fn insert(&mut self, subscriber: Subscriber) {
        debug!(nick = %subscriber.nick, "Roster: subscriber added");
        self.members.insert(0, subscriber);
    }

    /// Remove every entry with a normalized nick, in roster order.
    pub fn remove_all(&mut self, nick: &str) -> Vec<Subscriber> {
        let mut removed = Vec::new();
        self.members.retain(|s| {
            if s.nick == nick {
                removed.push(s.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            debug!(nick = %nick, count = removed.len(), "Roster: subscriber removed");
        }
        removed
    }

    /// Record a heartbeat. Returns `false` if the nick is absent.
    pub fn touch(&mut self, nick: &str, now: Instant) -> bool {
        match self.members.iter_mut().find(|s| s.nick == nick) {
            Some(subscriber) => {
                subscriber.last_beat = Some(now);
                true
            }
            None => false,
        }
    }

    /// Normalized nicks, in roster order.
    #[must_use]
    pub fn nicks(&self) -> Vec<String> {
        self.members.iter().map(|s| s.nick.clone()).collect()
    }

    /// Copy of the current members, for I/O outside the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.members.clone()
    }
}
