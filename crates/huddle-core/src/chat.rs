//! Room registry.
//!
//! `Chat` owns every room for the lifetime of the process. Rooms are
//! created once (normally at startup) and never removed.

use crate::archive::{bucket_name, ArchiveError};
use crate::context::ChatContext;
use crate::room::{Room, RoomConfig};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 256;

/// Registry errors.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Invalid room name.
    #[error("Invalid room name: {0}")]
    InvalidRoomName(&'static str),

    /// Room not found.
    #[error("{0} doesn't exists")]
    RoomNotFound(String),

    /// A room with this name is already registered.
    #[error("Room {0} exists")]
    RoomAlreadyExists(String),

    /// The room's archive bucket could not be created.
    #[error("Persistence error: {0}")]
    Persistence(#[from] ArchiveError),
}

/// Validate a room name.
///
/// # Errors
///
/// Returns an error message if the room name is invalid.
pub fn validate_room_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.len() > MAX_ROOM_NAME_LENGTH {
        return Err("Room name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Room name contains invalid characters");
    }
    Ok(())
}

/// The room registry.
#[derive(Debug)]
pub struct Chat {
    /// Rooms indexed by name.
    rooms: DashMap<String, Arc<Room>>,
    /// Shared handles given to every room.
    ctx: ChatContext,
}

impl Chat {
    /// Create an empty registry.
    #[must_use]
    pub fn new(ctx: ChatContext) -> Self {
        info!("Creating chat with context: {:?}", ctx);
        Self {
            rooms: DashMap::new(),
            ctx,
        }
    }

    /// Register a new room.
    ///
    /// Archived rooms get their bucket created (idempotently); rooms with a
    /// heartbeat interval get a liveness supervisor. Must be called from
    /// within a tokio runtime when the heartbeat is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or taken, or if the archive
    /// bucket cannot be created.
    pub fn create_room(&self, name: &str, config: RoomConfig) -> Result<Arc<Room>, ChatError> {
        validate_room_name(name).map_err(ChatError::InvalidRoomName)?;

        let slot = match self.rooms.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(ChatError::RoomAlreadyExists(name.to_string())),
            Entry::Vacant(slot) => slot,
        };

        if config.archived {
            let bucket = bucket_name(name);
            self.ctx.archive.create_bucket(&bucket)?;
            debug!(room = %name, bucket = %bucket, "Archive bucket ready");
        }

        let room = Arc::new(Room::new(name, config, self.ctx.clone()));
        // The supervisor holds a weak reference and lives as long as the room.
        let _ = room.spawn_supervisor();
        slot.insert(Arc::clone(&room));

        info!(
            room = %name,
            archived = config.archived,
            replay = config.archive_replay_count,
            heartbeat_secs = config.heartbeat_interval_secs,
            "Room created"
        );
        Ok(room)
    }

    /// Look up a room by name.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`] if no such room exists.
    pub fn get_room(&self, name: &str) -> Result<Arc<Room>, ChatError> {
        self.rooms
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ChatError::RoomNotFound(name.to_string()))
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// Get all room names.
    #[must_use]
    pub fn room_names(&self) -> Vec<String> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> ChatStats {
        ChatStats {
            room_count: self.rooms.len(),
            subscriber_count: self.rooms.iter().map(|e| e.subscriber_count()).sum(),
        }
    }

    /// Shared context handed to rooms.
    #[must_use]
    pub fn context(&self) -> &ChatContext {
        &self.ctx
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatStats {
    /// Number of rooms.
    pub room_count: usize,
    /// Subscribers across all rooms.
    pub subscriber_count: usize,
}
