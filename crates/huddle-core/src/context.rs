//! Shared engine context.
//!
//! Built once at startup and handed to [`Chat::new`](crate::Chat::new);
//! every room keeps a clone. Nothing in the engine reaches for globals.

use crate::archive::{ArchiveBackend, MemoryArchive};
use std::fmt;
use std::sync::Arc;

/// Default bound on concurrent sink writes per broadcast.
pub const DEFAULT_MAX_CONCURRENT_WRITES: usize = 64;

/// Handles shared by the registry and all rooms.
#[derive(Clone)]
pub struct ChatContext {
    /// Persistent archive collaborator.
    pub archive: Arc<dyn ArchiveBackend>,
    /// Maximum number of in-flight writes for one broadcast or probe sweep.
    pub max_concurrent_writes: usize,
}

impl ChatContext {
    /// Create a context around an archive backend.
    #[must_use]
    pub fn new(archive: Arc<dyn ArchiveBackend>) -> Self {
        Self {
            archive,
            max_concurrent_writes: DEFAULT_MAX_CONCURRENT_WRITES,
        }
    }

    /// Create a context with a fresh in-memory archive.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArchive::new()))
    }

    /// Set the per-broadcast write concurrency bound.
    #[must_use]
    pub fn with_max_concurrent_writes(mut self, limit: usize) -> Self {
        self.max_concurrent_writes = limit.max(1);
        self
    }
}

impl fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatContext")
            .field("max_concurrent_writes", &self.max_concurrent_writes)
            .finish_non_exhaustive()
    }
}
