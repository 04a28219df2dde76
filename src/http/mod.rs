//! HTTP Transport (C11): a thin `axum::Router` over C2-C5; no business
//! logic lives here beyond request parsing and response shaping
//! (§4.9).

pub mod events;
pub mod node;
pub mod response;
pub mod rules;
pub mod state;
pub mod telemetry;
pub mod time_range;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Main HTTP API, served on `http_port`. Carries no WebSocket route:
/// the original system ran its WebSocket server on a genuinely separate
/// port (`websocket_port`), so this router and [`ws_router`] are bound
/// to two independent listeners by the binary (§4.10, §6).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/heartbeat", post(telemetry::heartbeat))
        .route("/resource", post(telemetry::resource))
        .route("/node", get(node::get_node))
        .route("/node/metrics", get(node::node_metrics))
        .route("/node/historical-metrics", get(node::historical_metrics))
        .route("/node/historical-bmc", get(node::historical_bmc))
        .route("/alarm/rules", post(rules::create_rule).get(rules::list_rules))
        .route("/alarm/rules/:id", get(rules::get_rule))
        .route("/alarm/rules/:id/update", post(rules::update_rule))
        .route("/alarm/rules/:id/delete", post(rules::delete_rule))
        .route("/alarm/events", get(events::list_events))
        .route("/alarm/events/count", get(events::count_events))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// WebSocket listener, served on `websocket_port`.
pub fn ws_router(ws_state: crate::ws::WsState) -> Router {
    Router::new()
        .route("/ws", get(crate::ws::ws_handler))
        .layer(axum::Extension(ws_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> axum::response::Response {
    response::ok(serde_json::json!({ "status": "ok" }))
}
