//! Outbound sinks.
//!
//! A sink is the per-subscriber byte channel the engine writes to. The
//! transport owns the socket and drains the other end; the engine never
//! touches sockets directly.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink was closed, or its reader went away.
    #[error("Sink closed")]
    Closed,

    /// The write failed for a transport-specific reason.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Outbound byte channel for one subscriber.
///
/// Writes are fire-and-forget from the engine's point of view: an `Err`
/// means the peer is gone and the subscriber should be dropped.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Push one frame to the peer.
    async fn send(&self, data: Bytes) -> Result<(), SinkError>;

    /// Close the sink. Idempotent.
    fn close(&self);

    /// Check if the sink has been closed.
    fn is_closed(&self) -> bool;
}

/// Default number of frames a [`ChannelSink`] buffers for a slow reader.
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

/// A [`Sink`] backed by a bounded tokio channel.
///
/// The transport holds the matching [`SinkReceiver`] and flushes each
/// frame to its socket. Closing the sink ends the receiver's stream. A
/// reader that falls `capacity` frames behind makes writes fail, so a
/// stalled peer is dropped like a disconnected one.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
}

/// Reading half of a [`ChannelSink`].
pub type SinkReceiver = mpsc::Receiver<Bytes>;

impl ChannelSink {
    /// Create a sink with [`DEFAULT_SINK_CAPACITY`] and the receiver the
    /// transport drains.
    #[must_use]
    pub fn new() -> (Self, SinkReceiver) {
        Self::with_capacity(DEFAULT_SINK_CAPACITY)
    }

    /// Create a sink buffering at most `capacity` undelivered frames.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, SinkReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn send(&self, data: Bytes) -> Result<(), SinkError> {
        let guard = self.sender.lock();
        let tx = guard.as_ref().ok_or(SinkError::Closed)?;
        tx.try_send(data).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::SendFailed("backpressure".into()),
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn close(&self) {
        self.sender.lock().take();
    }

    fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map_or(true, mpsc::Sender::is_closed)
    }
}
