pub mod store;
pub mod wire;

use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{
    AppResult, notify,
    rooms::{self, RoomKey},
    transport::event::{RoomEvent, ServerEvent},
};

use store::{NewMessage, StoredMessage};

/// Where a send is aimed: a conversation key (fallback path, resolves and
/// lazily creates the room) or an already-joined room id (live path).
#[derive(Debug, Clone)]
pub enum SendTarget {
    Key(RoomKey),
    Room(i64),
}

#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub target: SendTarget,
    pub sender_id: i64,
    /// Explicit receiver; derived from the non-sender participant when absent.
    pub receiver_id: Option<i64>,
    pub content: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct Delivery {
    pub message: StoredMessage,
    /// False when this call found the row already persisted by the other
    /// delivery path for the same correlation id.
    pub created: bool,
}

/// Delivery coordinator. Resolves the room, persists the message at most
/// once per (room, correlation id), fans it out to live subscribers, and
/// raises a fire-and-forget notification for the receiver. The returned
/// server id is stable across a live/fallback retry pair.
pub async fn deliver(
    pool: &SqlitePool,
    events: &broadcast::Sender<RoomEvent>,
    outgoing: OutgoingMessage,
) -> AppResult<Delivery> {
    if outgoing.content.trim().is_empty() {
        return Err(crate::error::AppError::Invalid("message content must not be empty"));
    }

    let resolved = match &outgoing.target {
        SendTarget::Key(key) => rooms::resolve(pool, key).await?,
        SendTarget::Room(room_id) => rooms::load_room(pool, *room_id).await?,
    };
    resolved.ensure_member(outgoing.sender_id)?;

    let receiver_id = outgoing
        .receiver_id
        .or_else(|| resolved.counterpart(outgoing.sender_id));

    let (message, created) = store::insert_message(
        pool,
        NewMessage {
            room_id: resolved.room.id,
            correlation_id: &outgoing.correlation_id,
            sender_id: outgoing.sender_id,
            receiver_id,
            purchase_id: resolved.room.purchase_id,
            content: &outgoing.content,
        },
    )
    .await?;

    if created {
        // Subscribers reconcile by correlation id, so the originator's own
        // copy of this broadcast merges instead of duplicating.
        let _ = events.send(RoomEvent {
            room_id: resolved.room.id,
            event: ServerEvent::MessageReceived {
                message: message.clone().into(),
            },
        });

        if let Some(receiver_id) = receiver_id {
            notify::message_created(pool.clone(), receiver_id, &message);
        }
    }

    Ok(Delivery { message, created })
}
