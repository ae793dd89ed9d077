//! `/api/signals/subscribe` WebSocket projection of bus events (spec.md
//! §4.3, §5 "Backpressure", §6).
//!
//! Grounded in the teacher's `main.rs` `websocket_handler`/`handle_socket`
//! pair (`WebSocketUpgrade::on_upgrade`, replay-then-stream), generalized
//! from one hardcoded `WsServerEvent` broadcast to every [`Event`] the bus
//! carries, and fitted with the bounded-mpsc backpressure disconnect the
//! teacher's unbounded `broadcast::Receiver` loop didn't need.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bus::Envelope;

use super::AppState;

/// Backpressure ceiling (spec.md §5): a subscriber more than this many
/// frames behind is disconnected rather than buffered indefinitely.
const MAX_PENDING_FRAMES: usize = 256;

pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut bus_rx = state.bus.subscribe();
    let (tx, mut rx) = mpsc::channel::<Envelope>(MAX_PENDING_FRAMES);

    // Replay recent history first so a fresh connection isn't empty while
    // waiting for the next live event (teacher's "replay recent signals").
    for envelope in state.bus.recent(100).into_iter().rev() {
        if tx.send(envelope).await.is_err() {
            break;
        }
    }

    let forward_task = tokio::spawn(async move {
        loop {
            match bus_rx.recv().await {
                Ok(envelope) => {
                    if tx.try_send(envelope).is_err() {
                        warn!("websocket subscriber exceeded {MAX_PENDING_FRAMES} buffered frames, disconnecting");
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    loop {
        tokio::select! {
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let Ok(text) = serde_json::to_string(&envelope) else { continue };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket read error, disconnecting");
                        break;
                    }
                }
            }
        }
    }

    forward_task.abort();
}
