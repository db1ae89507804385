//! The dual-path send procedure: optimistic insert, live attempt under a
//! bounded wait, fallback attempt, and a terminal per-message outcome.

use std::{future::Future, time::Duration};

use tokio::time::timeout;
use uuid::Uuid;

use crate::{rooms::RoomKey, transport::event::AckStatus};

use super::view::Conversation;

#[derive(Debug, Clone)]
pub struct SendConfig {
    /// How long a live send may wait for its ack before the fallback path
    /// takes over. A late ack is still merged when it eventually arrives.
    pub ack_timeout: Duration,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LiveSendError {
    #[error("no live connection")]
    NotConnected,
    #[error("live channel closed")]
    ChannelClosed,
}

/// What the live channel reported for one send.
#[derive(Debug, Clone)]
pub struct LiveAck {
    pub server_id: Option<i64>,
    pub failed: bool,
}

/// A connected live channel the outbox can push one send through.
pub trait LiveChannel {
    fn is_connected(&self) -> bool;
    fn send(
        &self,
        room_id: i64,
        content: &str,
        correlation_id: &str,
    ) -> impl Future<Output = Result<LiveAck, LiveSendError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("malformed response body")]
    Decode,
}

/// The stateless twin: resolves the same conversation key server-side.
pub trait FallbackApi {
    fn send_message(
        &self,
        key: &RoomKey,
        content: &str,
        correlation_id: &str,
    ) -> impl Future<Output = Result<i64, FallbackError>> + Send;
}

/// Send one message. Generates the correlation id, appends the optimistic
/// entry, then races the live channel against its bounded wait with the
/// fallback channel behind it. The entry always ends terminal: `sent` on
/// either path's success, `failed` only when both are exhausted.
pub async fn send_message<L: LiveChannel, F: FallbackApi>(
    live: &L,
    fallback: &F,
    conversation: &mut Conversation,
    config: &SendConfig,
    key: &RoomKey,
    room_id: Option<i64>,
    sender_id: i64,
    content: &str,
    now_ms: i64,
) -> String {
    let correlation_id = Uuid::now_v7().to_string();
    send_with_correlation(
        live, fallback, conversation, config, key, room_id, sender_id, content, &correlation_id,
        now_ms,
    )
    .await;
    correlation_id
}

/// Same procedure under a caller-supplied correlation id (user-triggered
/// retry of a failed entry).
pub async fn send_with_correlation<L: LiveChannel, F: FallbackApi>(
    live: &L,
    fallback: &F,
    conversation: &mut Conversation,
    config: &SendConfig,
    key: &RoomKey,
    room_id: Option<i64>,
    sender_id: i64,
    content: &str,
    correlation_id: &str,
    now_ms: i64,
) {
    conversation.begin_send(correlation_id, sender_id, content, now_ms);

    if let Some(room_id) = room_id
        && live.is_connected()
    {
        match timeout(config.ack_timeout, live.send(room_id, content, correlation_id)).await {
            Ok(Ok(ack)) if !ack.failed => {
                conversation.apply_ack(correlation_id, ack.server_id, AckStatus::Sent);
                return;
            }
            // Rejected, dropped or timed out: the stateless path takes over.
            Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {}
        }
    }

    match fallback.send_message(key, content, correlation_id).await {
        Ok(server_id) => conversation.apply_fallback_sent(correlation_id, server_id),
        Err(err) => {
            tracing::debug!(error = %err, correlation_id, "both delivery paths exhausted");
            conversation.apply_send_failed(correlation_id);
        }
    }
}
