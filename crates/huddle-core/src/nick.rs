//! Nickname rules.
//!
//! A nickname is unique within a room by its normalized form: the first
//! [`MAX_NICK_LENGTH`] characters, lower-cased.

/// Minimum nickname length, in characters.
pub const MIN_NICK_LENGTH: usize = 3;

/// Nicknames are truncated to this many characters when normalized.
pub const MAX_NICK_LENGTH: usize = 10;

/// Identity used for system announcements. Nobody can join under it.
pub const SYSTEM_NICK: &str = "chatbot";

/// Normalize a nickname: truncate to [`MAX_NICK_LENGTH`] characters, then
/// lower-case.
#[must_use]
pub fn normalize_nick(nick: &str) -> String {
    let truncated: String = nick.chars().take(MAX_NICK_LENGTH).collect();
    let lowered = truncated.to_lowercase();
    // Some characters expand when lower-cased (`İ` -> `i̇`).
    if lowered.chars().count() > MAX_NICK_LENGTH {
        lowered.chars().take(MAX_NICK_LENGTH).collect()
    } else {
        lowered
    }
}

/// Check whether a nickname is long enough to be claimed.
#[must_use]
pub fn is_long_enough(nick: &str) -> bool {
    nick.chars().count() >= MIN_NICK_LENGTH
}

/// Check whether a nickname collides with the system identity.
#[must_use]
pub fn is_reserved(nick: &str) -> bool {
    normalize_nick(nick) == SYSTEM_NICK
}
