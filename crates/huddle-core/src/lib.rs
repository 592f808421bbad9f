//! # huddle-core
//!
//! Room broadcast engine for the Huddle chat server.
//!
//! This crate provides the stateful part of the system:
//!
//! - **Chat** - Registry of named rooms, the entry point for transports
//! - **Room** - Roster, broadcast fan-out, commands, archive replay, liveness
//! - **Roster** - Live subscribers keyed by normalized nickname
//! - **Archive** - Bounded replay of each room's history (redb or memory)
//! - **Session** - Per-connection frame dispatcher
//! - **Sink** - Outbound byte channel to one peer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│   Session   │────▶│    Chat     │────▶│    Room     │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                                       │       │
//!        │                 ┌─────────────┐                       │       ▼
//!        └─────────────────│    Sink     │◀──────── fan-out ─────┘  ┌─────────┐
//!                          └─────────────┘                          │ Archive │
//!                                                                   └─────────┘
//! ```

pub mod archive;
pub mod chat;
pub mod context;
pub mod format;
pub mod message;
pub mod nick;
pub mod room;
pub mod roster;
pub mod session;
pub mod sink;

pub use archive::{ArchiveBackend, ArchiveError, MemoryArchive, RedbArchive};
pub use chat::{Chat, ChatError, ChatStats};
pub use context::ChatContext;
pub use room::{Room, RoomConfig, RoomError};
pub use roster::{Roster, Subscriber};
pub use session::Session;
pub use sink::{ChannelSink, Sink, SinkError, SinkReceiver, DEFAULT_SINK_CAPACITY};
