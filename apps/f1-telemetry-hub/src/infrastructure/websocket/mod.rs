//! WebSocket Sessions
//!
//! One task per client reads control messages while a companion writer task
//! drains the connection's outbound queue into the socket. The broadcast
//! manager only ever touches the queue, so a slow socket can never stall a
//! broadcast.
//!
//! # Protocol
//!
//! - On connect the client gets `SESSION_INFO` or `NO_SESSION`.
//! - `SUBSCRIBE` / `UNSUBSCRIBE` carry `{"data": {"dataTypes": [...]}}`.
//! - `PING` is answered with `PONG`.
//! - An idle client receives `HEARTBEAT` every heartbeat interval.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::streaming::{ClientMessage, Envelope, MessageType};
use crate::domain::subscription::ConnectionId;
use crate::infrastructure::broadcast::{Connection, OutboundMessage};
use crate::infrastructure::http::AppState;

/// Query string accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Session to describe in the greeting instead of the current one.
    pub session_key: Option<String>,
}

/// Upgrade handler for `/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_key))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_key: Option<String>) {
    let (sink, mut stream) = socket.split();
    let (connection, outbound) = Connection::channel(state.websocket().outbound_capacity);
    let id = connection.id();
    let close = connection.close_signal();

    let writer = tokio::spawn(write_outbound(sink, outbound, close.clone()));
    let total = state.broadcast().register(Arc::new(connection));
    tracing::info!(connection_id = %id, total, "Client connected");

    greet(&state, id, session_key.as_deref()).await;
    state
        .broadcast()
        .broadcast(&state.broadcast().connection_stats())
        .await;

    let heartbeat = state.websocket().heartbeat_interval;
    loop {
        tokio::select! {
            biased;

            () = close.cancelled() => {
                tracing::debug!(connection_id = %id, "Close requested");
                break;
            }

            received = tokio::time::timeout(heartbeat, stream.next()) => {
                match received {
                    Err(_) => {
                        if state.broadcast().send_to(id, &Envelope::heartbeat()).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        tracing::debug!(connection_id = %id, error = %e, "WebSocket receive error");
                        break;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => handle_text(&state, id, text.as_str()).await,
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(_))) => {}
                }
            }
        }
    }

    state.broadcast().unregister(id);
    close.cancel();
    if let Err(e) = writer.await {
        tracing::warn!(connection_id = %id, error = %e, "Writer task failed");
    }
    tracing::info!(connection_id = %id, remaining = state.broadcast().count(), "Client disconnected");

    state
        .broadcast()
        .broadcast(&state.broadcast().connection_stats())
        .await;
}

async fn greet(state: &AppState, id: ConnectionId, session_key: Option<&str>) {
    let session = match session_key {
        Some(key) => state.sessions().session_by_key(key).await,
        None => state.sessions().current_session().await,
    };

    let envelope = match session {
        Some(session) => Envelope::new(
            MessageType::SessionInfo,
            serde_json::to_value(session).unwrap_or_default(),
        ),
        None => Envelope::new(MessageType::NoSession, json!({ "sessionKey": session_key })),
    };

    if let Err(e) = state.broadcast().send_to(id, &envelope).await {
        tracing::debug!(connection_id = %id, error = %e, "Greeting not delivered");
    }
}

async fn handle_text(state: &AppState, id: ConnectionId, text: &str) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Subscribe(topics)) => {
            let current = state.broadcast().subscribe(id, &topics);
            tracing::info!(connection_id = %id, requested = ?topics, subscribed = ?current, "Client subscribed");
        }
        Ok(ClientMessage::Unsubscribe(topics)) => {
            let current = state.broadcast().unsubscribe(id, &topics);
            tracing::info!(connection_id = %id, requested = ?topics, subscribed = ?current, "Client unsubscribed");
        }
        Ok(ClientMessage::Ping) => {
            if let Err(e) = state.broadcast().send_to(id, &Envelope::pong()).await {
                tracing::debug!(connection_id = %id, error = %e, "Pong not delivered");
            }
        }
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Ignoring malformed client message");
        }
    }
}

async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    close: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = close.cancelled() => break,

            message = outbound.recv() => {
                let Some(text) = message else { break };
                if let Err(e) = sink.send(Message::Text(text.as_ref().into())).await {
                    tracing::debug!(error = %e, "WebSocket send failed");
                    close.cancel();
                    return;
                }
            }
        }
    }

    if let Err(e) = sink.send(Message::Close(None)).await {
        tracing::debug!(error = %e, "Failed to send close frame");
    }
}
