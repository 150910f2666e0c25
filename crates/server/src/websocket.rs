//! Operator console WebSocket.
//!
//! Push channel only: consoles receive lifecycle and message events for
//! their tenant; lifecycle actions (claim, send, resolve) stay on the HTTP
//! API so the authoritative path never depends on this channel. A console
//! that disconnects misses events and re-fetches on reconnect.
//!
//! Connecting registers the operator's presence (and capacity) for the
//! after-hours signal; disconnecting deregisters it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use switchboard_protocol::{ConsoleCommand, ConsoleEvent};

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::OperatorRow;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Messages that can be sent through the WebSocket
enum OutboundMessage {
    Json(ConsoleEvent),
    Pong(Bytes),
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler for `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    // Authenticate before upgrading; browsers cannot set headers here, so
    // the token may arrive as a query parameter instead.
    let token = query
        .token
        .or_else(|| auth::bearer_token(&headers))
        .ok_or(ApiError::Unauthorized)?;
    let operator = auth::operator_from_token(&state.store, token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, operator)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, operator: OperatorRow) {
    let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = conn_id,
        operator_id = %operator.id,
        "Console connected"
    );

    // Seed the advisory load counter from the authoritative store
    let active_load = state
        .store
        .active_load(operator.id.clone())
        .await
        .unwrap_or(0);
    state.operators.register(&operator, active_load);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Channel for sending messages to this console
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(100);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let result = match msg {
                OutboundMessage::Json(event) => match serde_json::to_string(&event) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        warn!(
                            component = "websocket",
                            event = "ws.send.serialize_failed",
                            connection_id = conn_id,
                            error = %e,
                            "Failed to serialize console event"
                        );
                        continue;
                    }
                },
                OutboundMessage::Pong(data) => ws_tx.send(Message::Pong(data)).await,
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = conn_id,
                    "Send failed, console disconnected"
                );
                break;
            }
        }
    });

    // Forward the tenant's hub events until the console goes away
    spawn_event_forwarder(
        state.hub.subscribe(&operator.tenant_id),
        outbound_tx.clone(),
        conn_id,
    );

    // Initial queue snapshot so a reconnecting console starts from truth
    send_queue_snapshot(&state, &operator, None, &outbound_tx).await;

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundMessage::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => {
                info!(
                    component = "websocket",
                    event = "ws.connection.close_frame",
                    connection_id = conn_id,
                    "Console sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    connection_id = conn_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        let command: ConsoleCommand = match serde_json::from_str(&text) {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.message.parse_failed",
                    connection_id = conn_id,
                    error = %e,
                    "Failed to parse console command"
                );
                let _ = outbound_tx
                    .send(OutboundMessage::Json(ConsoleEvent::Error {
                        code: "parse_error".into(),
                        message: e.to_string(),
                    }))
                    .await;
                continue;
            }
        };

        match command {
            ConsoleCommand::ListHandoffs { status } => {
                send_queue_snapshot(&state, &operator, status, &outbound_tx).await;
            }
        }
    }

    state.operators.deregister(&operator.id);
    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = conn_id,
        operator_id = %operator.id,
        "Console disconnected"
    );
    send_task.abort();
}

/// Drain a hub receiver into the console's outbound channel. When the
/// console disconnects the outbound channel closes and the task exits,
/// dropping the broadcast receiver — no manual unsubscribe needed.
///
/// A lagging console gets a `Lagged` notice so it can re-fetch the queue.
fn spawn_event_forwarder(
    mut rx: tokio::sync::broadcast::Receiver<ConsoleEvent>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    conn_id: u64,
) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if outbound_tx
                        .send(OutboundMessage::Json(event))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        component = "websocket",
                        event = "ws.forward.lagged",
                        connection_id = conn_id,
                        skipped = skipped,
                        "Console lagged behind the event buffer"
                    );
                    if outbound_tx
                        .send(OutboundMessage::Json(ConsoleEvent::Lagged))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn send_queue_snapshot(
    state: &Arc<AppState>,
    operator: &OperatorRow,
    status: Option<switchboard_protocol::HandoffStatus>,
    outbound_tx: &mpsc::Sender<OutboundMessage>,
) {
    match state
        .store
        .handoffs_for_tenant(operator.tenant_id.clone(), status)
        .await
    {
        Ok(handoffs) => {
            let _ = outbound_tx
                .send(OutboundMessage::Json(ConsoleEvent::HandoffQueue {
                    handoffs,
                }))
                .await;
        }
        Err(e) => {
            warn!(
                component = "websocket",
                event = "ws.snapshot.failed",
                operator_id = %operator.id,
                error = %e,
                "Failed to load handoff queue"
            );
            let _ = outbound_tx
                .send(OutboundMessage::Json(ConsoleEvent::Error {
                    code: "snapshot_failed".into(),
                    message: "failed to load handoff queue".into(),
                }))
                .await;
        }
    }
}
