//! Cluster monitor daemon: boots the Orchestrator, serves the HTTP/
//! WebSocket API, and runs until signaled.

use cluster_monitor::config::AppConfig;
use cluster_monitor::http;
use cluster_monitor::orchestrator::Orchestrator;
use cluster_monitor::ws::WsState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cluster_monitor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting cluster monitor");

    let config_path = std::env::var("CLUSTER_MONITOR_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = AppConfig::load(&config_path)?;
    let http_port = config.http_port;
    let websocket_port = config.websocket_port;

    let orchestrator = Orchestrator::bootstrap(config).await?;
    let workers = orchestrator.spawn_workers();

    let state = http::AppState::from_orchestrator(&orchestrator);
    let ws_state = WsState { event_bus: orchestrator.event_bus.clone() };
    let app = http::router(state);
    let ws_app = http::ws_router(ws_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", http_port)).await?;
    tracing::info!(port = http_port, "listening for HTTP connections");

    let ws_listener = tokio::net::TcpListener::bind(("0.0.0.0", websocket_port)).await?;
    tracing::info!(port = websocket_port, "listening for WebSocket connections");

    let server = axum::serve(listener, app);
    let ws_server = axum::serve(ws_listener, ws_app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server exited with error");
            }
        }
        result = ws_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "WebSocket server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    orchestrator.shutdown(workers).await;
    tracing::info!("cluster monitor stopped");
    Ok(())
}
