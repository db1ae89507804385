//! The closed event set of the live channel. One tagged variant per event
//! name, validated at the boundary, so handlers match exhaustively instead
//! of probing optional fields.

use serde::{Deserialize, Serialize};

use crate::chat::wire::{
    MessageDto, ParticipantDto, UserProfileDto, string_id, string_id_opt, string_id_vec,
};

/// Events a client may send over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Handshake. Must precede everything else outside of the
    /// non-production unauthenticated mode.
    Authenticate { token: String },
    /// Join (and lazily create) the room for a conversation key.
    Join {
        #[serde(default, with = "string_id_opt")]
        purchase_id: Option<i64>,
        #[serde(default, with = "string_id_opt")]
        conversation_with: Option<i64>,
    },
    Send {
        #[serde(with = "string_id")]
        room_id: i64,
        content: String,
        correlation_id: String,
    },
    Leave {
        #[serde(with = "string_id")]
        room_id: i64,
    },
    MarkRead {
        #[serde(with = "string_id")]
        room_id: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Sent,
    Failed,
}

/// Events the server pushes to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Authenticated {
        user: UserProfileDto,
    },
    AuthFailed {
        reason: String,
    },
    /// First join of a room on this connection: membership plus history.
    RoomJoined {
        #[serde(with = "string_id")]
        room_id: i64,
        #[serde(default, with = "string_id_opt")]
        purchase_id: Option<i64>,
        participants: Vec<ParticipantDto>,
        history: Vec<MessageDto>,
    },
    /// Refresh of a room this connection already subscribes to.
    ChatHistory {
        #[serde(with = "string_id")]
        room_id: i64,
        history: Vec<MessageDto>,
    },
    MessageReceived {
        message: MessageDto,
    },
    /// Outcome of a `send`, correlated back to the optimistic entry.
    MessageAck {
        correlation_id: String,
        #[serde(default, with = "string_id_opt")]
        server_id: Option<i64>,
        status: AckStatus,
    },
    ReadReceipt {
        #[serde(with = "string_id")]
        room_id: i64,
        #[serde(with = "string_id_vec")]
        message_ids: Vec<i64>,
    },
    TransportError {
        code: String,
        message: String,
    },
}

/// A server event scoped to one room, published on the process-wide
/// broadcast. Each connection forwards only the rooms in its own
/// subscription index.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub room_id: i64,
    pub event: ServerEvent,
}
