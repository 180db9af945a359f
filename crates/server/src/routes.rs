use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::AppState;

/// Health check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Room listing with document and client counts
pub async fn list_rooms(State(state): State<AppState>) -> Json<Value> {
    let rooms = state.rooms.lock().await;
    let mut listing = Vec::with_capacity(rooms.len());
    for (name, handle) in rooms.iter() {
        let room = handle.lock().await;
        listing.push(json!({
            "name": name,
            "clients": room.clients.len(),
            "entries": room.state.entry_count(),
            "has_snapshot": room.state.has_snapshot(),
        }));
    }
    Json(json!({ "rooms": listing }))
}
