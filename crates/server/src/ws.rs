//! WebSocket push channel.
//!
//! One socket per client context. The server pushes `balance_update` and
//! `currency_changed` frames for the authenticated user, sends `heartbeat`
//! frames on an interval and answers `ping` with `pong`.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use walletsync_shared::{ClientMessage, ConnectedPayload, ServerMessage};

use crate::error::ApiProblem;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The token travels as a query parameter.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiProblem> {
    let token = params
        .token
        .ok_or_else(|| ApiProblem::unauthorized("Missing token"))?;
    let username = state.user_for_token(&token).await.ok_or_else(|| {
        tracing::warn!("WebSocket auth failed: unknown token");
        ApiProblem::unauthorized("Invalid or expired token")
    })?;

    tracing::info!("WebSocket connection authenticated for user: {}", username);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, username, state)))
}

/// Handle an authenticated WebSocket connection
async fn handle_socket(socket: WebSocket, username: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (forward_tx, mut forward_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let _ = forward_tx.send(ServerMessage::Connected(ConnectedPayload {
        username: Some(username.clone()),
    }));

    // Task to forward frames to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(message) = forward_rx.recv().await {
            if sender.send(Message::Text(message.to_json().into())).await.is_err() {
                break;
            }
        }
    });

    // Pushes addressed to this user
    let mut push_rx = state.pushes.subscribe();
    let forward_tx_push = forward_tx.clone();
    let push_user = username.clone();
    let push_task = tokio::spawn(async move {
        loop {
            match push_rx.recv().await {
                Ok(push) if push.username == push_user => {
                    if forward_tx_push.send(push.message).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Push stream for {} lagged by {} frames", push_user, skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let forward_tx_heartbeat = forward_tx.clone();
    let period = state.heartbeat_interval;
    let heartbeat_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if forward_tx_heartbeat.send(ServerMessage::Heartbeat).is_err() {
                break;
            }
        }
    });

    // Main receive loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match ClientMessage::parse(text.as_str()) {
                Ok(Some(ClientMessage::Ping(_))) => {
                    let _ = forward_tx.send(ServerMessage::Pong);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("Ignoring malformed frame from {}: {}", username, e),
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    heartbeat_task.abort();
    push_task.abort();
    send_task.abort();

    tracing::info!("WebSocket connection closed for user: {}", username);
}
