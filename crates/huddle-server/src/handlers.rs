//! Connection handlers for Huddle server.
//!
//! Each WebSocket connection gets a [`Session`] and a [`ChannelSink`]. A
//! writer task drains the sink into text frames while the read loop feeds
//! inbound text frames to the session.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use huddle_core::{Chat, ChatContext, ChannelSink, RedbArchive, Session, Sink, SinkReceiver};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// File name of the archive database inside the data directory.
pub const ARCHIVE_FILE: &str = "archive.redb";

/// Shared server state.
pub struct AppState {
    /// The room registry.
    pub chat: Arc<Chat>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Open the archive and create the configured rooms.
    ///
    /// Must be called from within a tokio runtime, since rooms with a
    /// heartbeat spawn their supervisor.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or archive cannot be opened,
    /// or if a configured room cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let db_path = data_dir.join(ARCHIVE_FILE);
        let archive = RedbArchive::open(&db_path)
            .with_context(|| format!("Failed to open archive {}", db_path.display()))?;
        info!(path = %db_path.display(), "Archive opened");

        let ctx = ChatContext::new(Arc::new(archive))
            .with_max_concurrent_writes(config.limits.max_concurrent_writes);
        let chat = Chat::new(ctx);

        for room in &config.rooms {
            chat.create_room(&room.name, room.config)
                .with_context(|| format!("Failed to create room {}", room.name))?;
        }
        metrics::record_stats(chat.stats());

        Ok(Self {
            chat: Arc::new(chat),
            config,
        })
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let app = app(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(health(&state))
}

fn health(state: &AppState) -> serde_json::Value {
    let stats = state.chat.stats();
    let mut rooms = state.chat.room_names();
    rooms.sort();
    serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": rooms,
        "subscribers": stats.subscriber_count,
    })
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max = state.config.limits.max_message_size;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    debug!("WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (sink, outbound) = ChannelSink::with_capacity(state.config.limits.sink_capacity);
    let sink = Arc::new(sink);
    let mut session = Session::new(Arc::clone(&state.chat), Arc::clone(&sink) as Arc<dyn Sink>);

    let mut writer = tokio::spawn(async move {
        forward_outbound(outbound, &mut sender).await;
        // Sink closed by the room (leave or eviction): end the connection.
        let _ = sender.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(nick = ?session.nick(), "Outbound stream closed");
                break;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_frame(text.len(), "inbound");
                        let was_joined = session.nick().is_some();
                        session.handle_frame(&text).await;
                        if !was_joined && session.nick().is_some() {
                            metrics::record_stats(state.chat.stats());
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "Binary frame ignored");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(nick = ?session.nick(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(nick = ?session.nick(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(nick = ?session.nick(), "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    session.close();
    sink.close();
    writer.abort();
    metrics::record_stats(state.chat.stats());

    debug!("WebSocket disconnected");
}

/// Write every queued payload as a text frame until the sink closes or
/// the socket fails.
async fn forward_outbound(
    mut outbound: SinkReceiver,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) {
    while let Some(data) = outbound.recv().await {
        let text = match String::from_utf8(data.to_vec()) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Outbound payload is not UTF-8");
                metrics::record_error("encoding");
                continue;
            }
        };
        metrics::record_frame(text.len(), "outbound");
        if sender.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}
