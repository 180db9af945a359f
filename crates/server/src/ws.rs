//! Websocket endpoint: one socket per client, one document per room.
//!
//! Each client gets a writer task fed by an unbounded channel; room
//! mutations happen under the room lock and broadcasts are fire-and-forget
//! sends into those channels, so a slow client never blocks the room.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};

use collab::protocol::{ClientMessage, ServerMessage};
use collab::room::RoomState;

use crate::AppState;

/// One room's document plus its connected clients
#[derive(Default)]
pub struct Room {
    pub state: RoomState,
    pub clients: HashMap<u64, mpsc::UnboundedSender<ServerMessage>>,
}

impl Room {
    /// Send to every connected client, sender included; sessions skip their
    /// own echoes by origin tag
    pub fn broadcast(&self, msg: &ServerMessage) {
        for tx in self.clients.values() {
            let _ = tx.send(msg.clone());
        }
    }
}

pub type RoomHandle = Arc<Mutex<Room>>;

pub async fn ws_handler(
    Path(room): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let handle = state.room(&room).await;
    ws.on_upgrade(move |socket| client_loop(room, handle, socket))
}

async fn client_loop(room_name: String, room: RoomHandle, socket: WebSocket) {
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let client_id = {
        let mut room = room.lock().await;
        let (client_id, welcome) = room.state.join();
        room.clients.insert(client_id, tx.clone());
        let _ = tx.send(welcome);
        client_id
    };
    tracing::info!(room = %room_name, client_id, "client joined");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode server message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(msg) => {
                    let mut room = room.lock().await;
                    for out in room.state.handle(client_id, msg) {
                        room.broadcast(&out);
                    }
                }
                Err(e) => {
                    tracing::warn!(room = %room_name, client_id, error = %e, "bad client frame")
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {} // ping/pong/binary
        }
    }

    {
        let mut room = room.lock().await;
        room.clients.remove(&client_id);
        for out in room.state.leave(client_id) {
            room.broadcast(&out);
        }
    }
    writer.abort();
    tracing::info!(room = %room_name, client_id, "client left");
}
