use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tandem_core::{ClientMessage, RelayMessage, RoomId, SessionId};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let room_id = match RoomId::parse(&room_id) {
        Ok(room_id) => room_id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, room_id, state))
}

async fn handle_socket(socket: WebSocket, room_id: RoomId, state: AppState) {
    let session_id = SessionId::new();
    info!("New WebSocket connection {} for room {}", session_id, room_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_session(session_id, tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let ice_servers = state.relay.resolve_ice_servers(session_id).await;
    state
        .signaling
        .send_message(session_id, &RelayMessage::IceServers(ice_servers));

    if state.relay.join(&room_id, session_id).await.is_err() {
        state.signaling.close_session(session_id);
        let _ = send_task.await;
        state.signaling.remove_session(&session_id);
        info!("WebSocket {} closed: room {} is full", session_id, room_id);
        return;
    }

    let mut recv_task = tokio::spawn({
        let relay = state.relay.clone();
        let room_id = room_id.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Signal(signal)) => {
                            relay.relay(&room_id, session_id, signal).await;
                        }
                        Ok(ClientMessage::Leave) => break,
                        Err(e) => warn!("Invalid message from {}: {}", session_id, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.relay.leave(&room_id, session_id).await;
    state.signaling.remove_session(&session_id);
    info!("WebSocket disconnected: {}", session_id);
}
