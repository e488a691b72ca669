//! Main Entrypoint for the Live Agent API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Selecting the agent pipeline provider.
//! 3. Creating the session store and its expiry sweeper.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use axum::http::HeaderValue;
use chrono::Utc;
use clap::Parser;
use liveagent_api::{
    config::Config, router::create_router, state::AppState, ws::provider::build_pipeline,
};
use liveagent_core::store::{InMemorySessionStore, SessionStore};
use std::{fs, net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(version, about = "Streams client sessions to a live agent pipeline")]
struct Args {
    /// Overrides BIND_ADDRESS.
    #[arg(long)]
    bind_address: Option<SocketAddr>,
}

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// Periodically drops detached sessions whose retention has lapsed.
fn spawn_sweeper(sessions: Arc<dyn SessionStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_expired(Utc::now()).await;
            if evicted > 0 {
                debug!(evicted, "Evicted expired sessions");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(bind_address) = args.bind_address {
        config.bind_address = bind_address;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 2. Agent Pipeline ---
    let system_prompt = match &config.system_prompt_path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt from {}", path.display()))?,
        ),
        None => None,
    };
    let pipeline = build_pipeline(&config, system_prompt)?;

    // --- 3. Session Store ---
    let sessions: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::new(config.session_ttl_chrono()));
    spawn_sweeper(sessions.clone());

    let app_state = Arc::new(AppState {
        pipeline,
        sessions,
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let app = create_router(app_state).layer(cors_layer(&config.allowed_origins));

    // --- 5. Start Server ---
    info!(
        provider = ?config.provider,
        turn_detection = ?config.turn_detection,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
