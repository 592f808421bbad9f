//! # Huddle Server
//!
//! WebSocket room chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (reads ./huddle.toml if present)
//! huddle
//!
//! # Run with environment variables
//! HUDDLE_PORT=8080 HUDDLE_HOST=0.0.0.0 huddle
//!
//! # Adjust log verbosity
//! RUST_LOG=huddle=info,huddle_core=trace huddle
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,huddle_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!(
        "Starting Huddle server on {}:{} with {} room(s)",
        config.host,
        config.port,
        config.rooms.len()
    );

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
