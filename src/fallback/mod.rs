//! Stateless request/response twin of the live channel. Rooms resolve by
//! the identical derivation rule, and sends publish into the same fan-out,
//! so a message posted here reaches socket-connected participants without
//! a reload.

use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    chat::{
        self, OutgoingMessage, SendTarget,
        wire::{MessageDto, ParticipantDto, RoomDto, string_id, string_id_opt, string_id_vec},
    },
    error::AppError,
    rooms::{self, ConversationQuery, RoomKey},
    session::CurrentUser,
    transport::event::{RoomEvent, ServerEvent},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_messages).post(send_message).patch(mark_read))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub room: RoomDto,
    pub participants: Vec<ParticipantDto>,
    pub messages: Vec<MessageDto>,
}

/// `GET /messages?purchaseId=` or `?conversationWith=`. Resolving the room
/// lazily creates it, so the first read of a purchase conversation already
/// yields the room and its (empty) history.
#[debug_handler]
async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<ConversationQuery>,
) -> AppResult<Json<ConversationSnapshot>> {
    let key = query.into_key(Some(user_id))?;
    let resolved = rooms::resolve(&state.db_pool, &key).await?;
    resolved.ensure_member(user_id)?;

    let participants = rooms::load_participants(&state.db_pool, resolved.room.id).await?;
    let messages = chat::store::list_messages(&state.db_pool, resolved.room.id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(ConversationSnapshot {
        room: RoomDto::from(&resolved.room),
        participants,
        messages,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub content: String,
    #[serde(default, with = "string_id_opt")]
    pub receiver_id: Option<i64>,
    #[serde(default, with = "string_id_opt")]
    pub purchase_id: Option<i64>,
    /// Client-minted idempotency key; minted server-side when absent so the
    /// store always has one.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    #[serde(with = "string_id")]
    pub id: i64,
    pub correlation_id: String,
}

/// `POST /messages`. The purchase id scopes the conversation when present;
/// otherwise an explicit receiver opens (or reuses) the direct room.
#[debug_handler]
async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<SendMessageBody>,
) -> AppResult<Json<SendReceipt>> {
    let key = match (body.purchase_id, body.receiver_id) {
        (Some(purchase_id), _) => RoomKey::Purchase(purchase_id),
        (None, Some(receiver_id)) => {
            ConversationQuery {
                purchase_id: None,
                conversation_with: Some(receiver_id),
            }
            .into_key(Some(user_id))?
        }
        (None, None) => {
            return Err(AppError::Invalid("receiverId or purchaseId is required"));
        }
    };
    let correlation_id = body
        .correlation_id
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    let delivery = chat::deliver(
        &state.db_pool,
        &state.events,
        OutgoingMessage {
            target: SendTarget::Key(key),
            sender_id: user_id,
            receiver_id: body.receiver_id,
            content: body.content,
            correlation_id: correlation_id.clone(),
        },
    )
    .await?;

    Ok(Json(SendReceipt {
        id: delivery.message.id,
        correlation_id,
    }))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadQuery {
    pub purchase_id: Option<i64>,
    pub conversation_with: Option<i64>,
    /// Restrict to one message; absent means all unread for this caller.
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadReceipt {
    pub updated: usize,
    #[serde(with = "string_id_vec")]
    pub message_ids: Vec<i64>,
}

/// `PATCH /messages`. Batched false→true read transition for the caller as
/// receiver; live subscribers get a read receipt.
#[debug_handler]
async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<MarkReadQuery>,
) -> AppResult<Json<MarkReadReceipt>> {
    let key = ConversationQuery {
        purchase_id: query.purchase_id,
        conversation_with: query.conversation_with,
    }
    .into_key(Some(user_id))?;
    let resolved = rooms::resolve(&state.db_pool, &key).await?;
    resolved.ensure_member(user_id)?;

    let message_ids =
        chat::store::mark_read(&state.db_pool, resolved.room.id, user_id, query.message_id)
            .await?;
    if !message_ids.is_empty() {
        let _ = state.events.send(RoomEvent {
            room_id: resolved.room.id,
            event: ServerEvent::ReadReceipt {
                room_id: resolved.room.id,
                message_ids: message_ids.clone(),
            },
        });
    }

    Ok(Json(MarkReadReceipt {
        updated: message_ids.len(),
        message_ids,
    }))
}
