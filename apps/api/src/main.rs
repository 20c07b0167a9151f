mod campaign;
mod config;
mod errors;
mod routes;
mod state;
mod voice;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::campaign::manager::CampaignManager;
use crate::campaign::store::SnapshotStore;
use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;
use crate::voice::{VoiceClient, VoiceProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Switchboard API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize snapshot store
    let store = SnapshotStore::new(&config.data_dir)?;
    info!("Snapshot store at {}", config.data_dir);

    // Initialize voice provider client
    let voice: Arc<dyn VoiceProvider> = Arc::new(VoiceClient::new(
        config.voice_base_url.clone(),
        config.voice_api_key.clone(),
    )?);
    info!("Voice client initialized ({})", config.voice_base_url);

    // Campaign registry
    let campaigns = Arc::new(CampaignManager::new(
        store,
        config.voice_assistant_id.clone(),
        config.max_parallel_calls,
    ));
    info!("Parallel call cap: {}", config.max_parallel_calls);

    // Build app state
    let state = AppState {
        config: config.clone(),
        voice,
        campaigns,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
