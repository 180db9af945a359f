use std::collections::HashMap;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

mod routes;
mod ws;

/// Shared server state: one room document per room name
#[derive(Clone, Default)]
pub struct AppState {
    pub rooms: Arc<Mutex<HashMap<String, ws::RoomHandle>>>,
}

impl AppState {
    /// Get or create a room
    pub async fn room(&self, name: &str) -> ws::RoomHandle {
        let mut rooms = self.rooms.lock().await;
        rooms.entry(name.to_string()).or_default().clone()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state = AppState::default();

    let app = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/rooms", get(routes::list_rooms))
        .route("/ws/{room}", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!("Sync server running on {}", addr);
    axum::serve(listener, app).await.unwrap();
}
