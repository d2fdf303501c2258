mod auth;
mod config;
mod error;
mod gateway;
mod locate;
mod models;
mod sink;
mod tracker;
mod video_api;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "videogen_relay=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.gateway_key_is_fallback {
        warn!("No gateway key configured; intake requests must use the generated fallback key");
    }

    let state = AppState {
        config: config.clone(),
    };

    let app = Router::new()
        .route("/healthz", get(gateway::healthz))
        .route("/v1/generations", post(gateway::create_generation))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("videogen-relay listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
