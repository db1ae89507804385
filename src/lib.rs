pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod fallback;
pub mod notify;
pub mod purchases;
pub mod rooms;
pub mod session;
pub mod transport;

use axum::{Router, extract::FromRef, routing::get};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

pub use config::Config;
pub use error::{AppError, AppResult};

use transport::event::RoomEvent;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    /// Process-wide fan-out of room-scoped events. Connections filter it
    /// through their own subscription index; the database stays the only
    /// authority for rooms and messages.
    pub events: broadcast::Sender<RoomEvent>,
    pub config: Config,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        Self {
            db_pool,
            events: broadcast::channel(256).0,
            config,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(transport::chat_ws))
        .nest("/messages", fallback::router())
        .nest("/rooms", rooms::router())
}
