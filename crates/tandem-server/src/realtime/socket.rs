//! WebSocket endpoint.
//!
//! Clients connect with `GET /ws?token=<bearer>`. The socket is
//! server-push only: inbound text frames are ignored, and the connection
//! lives until the client closes it or its queue is dropped (superseded by
//! a newer connection or server shutdown).

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use tandem_shared::types::UserId;

use crate::api::AppState;
use crate::auth;
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<SocketParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| auth::token_from_headers(&headers));

    let user = match token.as_deref().map(|t| state.keys.verify(t)) {
        Some(Ok(user)) => user,
        Some(Err(e)) => {
            warn!("WebSocket rejected: invalid token");
            return e.into_response();
        }
        None => {
            warn!("WebSocket rejected: no token");
            return ServiceError::Unauthorized.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn handle_socket(state: AppState, user: UserId, socket: WebSocket) {
    let mut conn = state.dispatcher.connect(user).await;
    info!(user = %user, conn = %conn.id, "Socket connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = conn.events.recv() => {
                let Some(event) = outbound else {
                    debug!(user = %user, conn = %conn.id, "Event queue closed");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                };
                let payload = match event.to_json() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(event = event.kind(), error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(payload)).await.is_err() {
                    break;
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(user = %user, len = text.len(), "Ignoring inbound text frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(user = %user, error = %e, "Socket read failed");
                        break;
                    }
                }
            }
        }
    }

    let removed = state.dispatcher.disconnect(&conn).await;
    info!(user = %user, conn = %conn.id, removed, "Socket disconnected");
}
