mod list;
mod resolve;

use axum::{Router, routing::get};
use serde::Deserialize;

use crate::{AppResult, AppState, error::AppError};

pub use resolve::{load_participants, load_room, resolve};

/// Conversation key. Either form derives a deterministic room name, so any
/// two resolution attempts for the same conversation converge on one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// Transaction-scoped chat between the buyer and seller of a purchase.
    Purchase(i64),
    /// Peer-to-peer chat; user ids are kept sorted ascending.
    Direct(i64, i64),
}

impl RoomKey {
    pub fn direct(a: i64, b: i64) -> Self {
        RoomKey::Direct(a.min(b), a.max(b))
    }

    pub fn name(&self) -> String {
        match self {
            RoomKey::Purchase(id) => format!("purchase_{id}"),
            RoomKey::Direct(lo, hi) => format!("direct_{lo}_{hi}"),
        }
    }

    pub fn purchase_id(&self) -> Option<i64> {
        match self {
            RoomKey::Purchase(id) => Some(*id),
            RoomKey::Direct(..) => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub purchase_id: Option<i64>,
    pub created_at: i64,
}

impl Room {
    /// Recover the conversation key this room was named after.
    pub fn key(&self) -> AppResult<RoomKey> {
        if let Some(purchase_id) = self.purchase_id {
            return Ok(RoomKey::Purchase(purchase_id));
        }
        let malformed = AppError::Invalid("room name does not encode a conversation");
        let Some(rest) = self.name.strip_prefix("direct_") else {
            return Err(malformed);
        };
        let Some((lo, hi)) = rest.split_once('_') else {
            return Err(malformed);
        };
        match (lo.parse(), hi.parse()) {
            (Ok(lo), Ok(hi)) => Ok(RoomKey::Direct(lo, hi)),
            _ => Err(malformed),
        }
    }
}

/// A room together with its current participant set (hidden members
/// included; hiding only affects the caller's conversation list).
#[derive(Debug, Clone)]
pub struct ResolvedRoom {
    pub room: Room,
    pub participants: Vec<i64>,
}

impl ResolvedRoom {
    pub fn ensure_member(&self, user_id: i64) -> AppResult<()> {
        if self.participants.contains(&user_id) {
            Ok(())
        } else {
            Err(AppError::NotParticipant)
        }
    }

    /// The non-sender side of the conversation, when there is one.
    pub fn counterpart(&self, user_id: i64) -> Option<i64> {
        self.participants.iter().copied().find(|&u| u != user_id)
    }
}

/// Conversation scoping accepted by the fallback channel and the live
/// join event: exactly one of `purchaseId` / `conversationWith`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub purchase_id: Option<i64>,
    pub conversation_with: Option<i64>,
}

impl ConversationQuery {
    pub fn into_key(self, me: Option<i64>) -> AppResult<RoomKey> {
        match (self.purchase_id, self.conversation_with) {
            (Some(purchase_id), None) => Ok(RoomKey::Purchase(purchase_id)),
            (None, Some(other)) => {
                let me = me.ok_or(AppError::Unauthenticated)?;
                if me == other {
                    return Err(AppError::Invalid("cannot open a conversation with yourself"));
                }
                Ok(RoomKey::direct(me, other))
            }
            _ => Err(AppError::Invalid(
                "exactly one of purchaseId and conversationWith is required",
            )),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::list_rooms))
        .route("/{id}", axum::routing::delete(list::leave_room))
}
