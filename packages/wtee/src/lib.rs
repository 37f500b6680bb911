// Library interface for wtee
// Tees stdin to stdout and streams completed lines to websocket clients.

pub mod actor;
pub mod bridge;
pub mod broadcast;
pub mod config;
pub mod encoding;
pub mod error;
pub mod handle;
pub mod input;
pub mod lifecycle;
pub mod metrics;
pub mod reassembler;
pub mod registry;
#[cfg(unix)]
pub mod stdin;
pub mod views;
pub mod websocket;

#[cfg(test)]
mod test_helpers;

pub use actor::{BridgeActor, BridgeConfig, BridgeStatus};
pub use bridge::{ChunkOutcome, StdinBridge, StreamState};
pub use broadcast::{BroadcastChannel, Delivery, Outboxes, Payload};
pub use config::{Args, Settings};
pub use encoding::InputEncoding;
pub use error::BridgeError;
pub use handle::{BridgeHandle, ClientConnection};
pub use input::{ChannelSource, InputSource};
pub use metrics::BridgeMetrics;
pub use reassembler::{Line, LineReassembler};
pub use registry::{ClientId, ClientRegistry, Transition};

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub bridge: BridgeHandle,
    pub settings: Arc<Settings>,
}

/// Routes are mounted under the configured relative root.
pub fn create_router(state: AppState) -> Router {
    let root = state.settings.relative_root.clone();

    let mut router = Router::new()
        .route(&root, get(views::index_page))
        .route(&format!("{}ws", root), get(websocket_handler))
        .route(&format!("{}health", root), get(health_handler))
        .route(&format!("{}api/status", root), get(status_handler));

    if root != "/" {
        router = router.route(root.trim_end_matches('/'), get(views::index_page));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_websocket(socket, state.bridge))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.bridge.status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "bridge": status,
                "metrics": state.bridge.metrics().snapshot(),
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string(), "code": e.error_code() })),
        )
            .into_response(),
    }
}
