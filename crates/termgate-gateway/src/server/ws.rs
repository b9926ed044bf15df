//! The stream channel: WebSocket handshake, token check and the frame
//! loop binding one socket to one session broker.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::Claims;
use crate::session::{ClientMessage, SessionBroker};

use super::AppState;
use super::error::ApiError;

/// Buffered outbound frames per stream. Forwarders block when the client
/// reads slowly, which is the backpressure we want.
const OUTBOUND_CAPACITY: usize = 256;

/// Handshake: the bearer token arrives either as a `token` query parameter
/// or in the `Authorization` header. Verification failure closes the
/// channel before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = params.get("token").cloned().or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
    });

    let Some(token) = token else {
        return ApiError::Unauthorized.into_response();
    };
    match state.tokens.verify(&token) {
        Ok(claims) => ws.on_upgrade(move |socket| run_stream(socket, state, claims)),
        Err(_) => {
            debug!("Stream handshake with invalid token");
            ApiError::Unauthorized.into_response()
        }
    }
}

/// Frame loop for one authenticated client. Inbound frames are handled in
/// arrival order on this task, which is what serializes `terminal:input`
/// per stream.
async fn run_stream(mut socket: WebSocket, state: AppState, claims: Claims) {
    info!(user_id = %claims.sub, "Stream opened");

    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let mut broker = SessionBroker::new(
        claims.sub.clone(),
        state.db.clone(),
        state.profiles.clone(),
        state.manager.clone(),
        state.assistant.clone(),
        outbound_tx,
    );

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => broker.handle(message).await,
                    Err(err) => broker.protocol_error(&err.to_string()).await,
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(user_id = %claims.sub, error = %err, "Stream receive error");
                    break;
                }
            },
            frame = outbound_rx.recv() => {
                // the broker holds a sender, so this arm never sees None
                // before the loop breaks
                let Some(frame) = frame else { break };
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "Outbound frame serialization failed"),
                }
            }
        }
    }

    broker.shutdown().await;
    info!(user_id = %claims.sub, "Stream closed");
}
