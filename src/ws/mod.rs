//! WebSocket Transport (C12): `/ws` broadcasts serialized `AlarmEvent`s
//! to every open connection via a bounded per-connection queue drained
//! by a dedicated sender loop, so a slow client never blocks the Event
//! Bus (§4.10, §9 "blocking WebSocket sends" redesign flag).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};

use crate::event_bus::EventBus;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WsState {
    pub event_bus: Arc<EventBus>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, Extension(state): Extension<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.event_bus))
}

async fn handle_socket(socket: WebSocket, event_bus: Arc<EventBus>) {
    let (mut sink, mut stream) = socket.split();
    let (subscriber_id, mut events) = event_bus.subscribe().await;

    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
    let mut awaiting_pong = false;
    let mut pong_deadline = tokio::time::Instant::now() + PONG_TIMEOUT;

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize alarm event for websocket");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            _ = ping_ticker.tick() => {
                if awaiting_pong && tokio::time::Instant::now() >= pong_deadline {
                    tracing::warn!(subscriber_id, "websocket client missed pong deadline, closing");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
                pong_deadline = tokio::time::Instant::now() + PONG_TIMEOUT;
            }
        }
    }

    event_bus.unsubscribe(subscriber_id).await;
}
