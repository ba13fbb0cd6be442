//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::verify_jwt;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            info!(user_id = %claims.sub, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    info!(user_id = %user_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let public_rx = state.broadcaster.subscribe_public();
    let private_rx = state.broadcaster.subscribe_user(user_id);

    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };
    let current = ServerMsg::GameState {
        state: state.game.state().current_state(),
    };
    for msg in [welcome, current] {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            error!(user_id = %user_id, error = %e, "Failed to send greeting");
            state.broadcaster.release_user(user_id);
            return;
        }
    }

    run_session(user_id, ws_sink, ws_stream, public_rx, private_rx).await;

    state.broadcaster.release_user(user_id);
    info!(user_id = %user_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    user_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut public_rx: broadcast::Receiver<ServerMsg>,
    mut private_rx: broadcast::Receiver<ServerMsg>,
) {
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMsg>(16);

    // Writer task: broadcasts and replies -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                msg = public_rx.recv() => msg,
                msg = private_rx.recv() => msg,
                Some(msg) = reply_rx.recv() => Ok(msg),
            };

            match next {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(user_id = %user_id, lagged_count = n, "Client lagged, skipping updates");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(user_id = %user_id, "Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: only pings and close frames are expected
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(ClientMsg::Ping { t }) => {
                    if reply_tx.send(ServerMsg::Pong { t }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                    let reply = ServerMsg::Error {
                        code: "invalid_message".to_string(),
                        message: e.to_string(),
                    };
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
