mod config;
mod error;
mod ice;
mod room;
mod signaling;

pub use config::*;
pub use error::*;
pub use ice::*;
pub use room::*;
pub use signaling::*;

use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tracing::info;

/// Shared state of the relay's HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub signaling: SignalingService,
    pub relay: SignalingRelay,
}

impl AppState {
    pub fn new(ice: Arc<dyn IceServerSource>) -> Self {
        let signaling = SignalingService::new();
        let relay = SignalingRelay::new(Arc::new(signaling.clone()), ice);
        Self { signaling, relay }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        let provider = IceServerProvider::new(config.turn_origin.clone(), config.turn_token.clone());
        Self::new(Arc::new(provider))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{room_id}", get(ws_handler))
        .with_state(state)
}

/// Binds the configured address and serves the relay until the listener fails.
pub async fn serve(config: RelayConfig) -> std::io::Result<()> {
    let state = AppState::from_config(&config);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Signaling relay listening on ws://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
