pub mod event;

use std::{collections::HashSet, sync::Arc};

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast, mpsc};

use crate::{
    AppResult, AppState, auth,
    auth::AuthedUser,
    chat::{self, OutgoingMessage, SendTarget, wire::UserProfileDto},
    error::AppError,
    rooms::{self, ConversationQuery},
};

use event::{AckStatus, ClientEvent, RoomEvent, ServerEvent};

/// Rooms this connection is subscribed to. Connection-local only; the room
/// directory stays the single authority for membership and content.
type SubscriptionIndex = Arc<Mutex<HashSet<i64>>>;

struct ConnSession {
    user: Option<AuthedUser>,
}

impl ConnSession {
    fn require_user(&self) -> AppResult<i64> {
        self.user.as_ref().map(|u| u.id).ok_or(AppError::Unauthenticated)
    }
}

#[debug_handler]
pub async fn chat_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(async move |socket| {
        run_connection(state, socket).await;
    })
}

async fn run_connection(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(64);
    let joined: SubscriptionIndex = Arc::new(Mutex::new(HashSet::new()));

    // Single writer task owns the sink, so acks, errors and forwarded
    // broadcasts reach the client in emission order.
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else { continue };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let forward = {
        let joined = joined.clone();
        let out_tx = out_tx.clone();
        let mut events = state.events.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RoomEvent { room_id, event }) => {
                        // Drop the index lock before the (possibly slow)
                        // outbound send.
                        let subscribed = joined.lock().await.contains(&room_id);
                        if subscribed && out_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "chat socket lagged behind fan-out");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let mut conn = ConnSession { user: None };
    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event = match serde_json::from_slice::<ClientEvent>(text.as_bytes()) {
            Ok(event) => event,
            Err(err) => {
                let _ = out_tx
                    .send(ServerEvent::TransportError {
                        code: "invalid_event".into(),
                        message: err.to_string(),
                    })
                    .await;
                continue;
            }
        };

        if let Err(err) = handle_event(&state, &mut conn, &joined, &out_tx, event).await {
            let _ = out_tx
                .send(ServerEvent::TransportError {
                    code: err.code().into(),
                    message: err.to_string(),
                })
                .await;
        }
    }

    writer.abort();
    forward.abort();
}

async fn handle_event(
    state: &AppState,
    conn: &mut ConnSession,
    joined: &SubscriptionIndex,
    out_tx: &mpsc::Sender<ServerEvent>,
    event: ClientEvent,
) -> AppResult<()> {
    match event {
        ClientEvent::Authenticate { token } => {
            match auth::resolve_token(&state.db_pool, &token).await? {
                Some(user) => {
                    let profile = UserProfileDto {
                        id: user.id,
                        display_name: user.display_name.clone(),
                    };
                    conn.user = Some(user);
                    let _ = out_tx.send(ServerEvent::Authenticated { user: profile }).await;
                }
                None => {
                    let _ = out_tx
                        .send(ServerEvent::AuthFailed { reason: "unknown token".into() })
                        .await;
                }
            }
            Ok(())
        }

        ClientEvent::Join { purchase_id, conversation_with } => {
            let user_id = match conn.require_user() {
                Ok(id) => Some(id),
                // Non-production escape hatch: an unauthenticated socket may
                // observe purchase rooms, but never send.
                Err(_) if state.config.allow_unauthenticated => None,
                Err(err) => return Err(err),
            };
            let key = ConversationQuery { purchase_id, conversation_with }.into_key(user_id)?;

            let resolved = rooms::resolve(&state.db_pool, &key).await?;
            if let Some(user_id) = user_id {
                resolved.ensure_member(user_id)?;
            }

            let history: Vec<_> = chat::store::list_messages(&state.db_pool, resolved.room.id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();

            let already_joined = !joined.lock().await.insert(resolved.room.id);
            let event = if already_joined {
                ServerEvent::ChatHistory { room_id: resolved.room.id, history }
            } else {
                ServerEvent::RoomJoined {
                    room_id: resolved.room.id,
                    purchase_id: resolved.room.purchase_id,
                    participants: rooms::load_participants(&state.db_pool, resolved.room.id)
                        .await?,
                    history,
                }
            };
            let _ = out_tx.send(event).await;
            Ok(())
        }

        ClientEvent::Send { room_id, content, correlation_id } => {
            let sender_id = conn.require_user()?;
            if !joined.lock().await.contains(&room_id) {
                return Err(AppError::NotParticipant);
            }

            let outcome = chat::deliver(
                &state.db_pool,
                &state.events,
                OutgoingMessage {
                    target: SendTarget::Room(room_id),
                    sender_id,
                    receiver_id: None,
                    content,
                    correlation_id: correlation_id.clone(),
                },
            )
            .await;

            let ack = match outcome {
                Ok(delivery) => ServerEvent::MessageAck {
                    correlation_id,
                    server_id: Some(delivery.message.id),
                    status: AckStatus::Sent,
                },
                Err(err) => {
                    tracing::debug!(error = %err, "live send failed");
                    ServerEvent::MessageAck {
                        correlation_id,
                        server_id: None,
                        status: AckStatus::Failed,
                    }
                }
            };
            let _ = out_tx.send(ack).await;
            Ok(())
        }

        ClientEvent::Leave { room_id } => {
            joined.lock().await.remove(&room_id);
            Ok(())
        }

        ClientEvent::MarkRead { room_id } => {
            let user_id = conn.require_user()?;
            if !joined.lock().await.contains(&room_id) {
                return Err(AppError::NotParticipant);
            }
            let message_ids =
                chat::store::mark_read(&state.db_pool, room_id, user_id, None).await?;
            if !message_ids.is_empty() {
                let _ = state.events.send(RoomEvent {
                    room_id,
                    event: ServerEvent::ReadReceipt { room_id, message_ids },
                });
            }
            Ok(())
        }
    }
}
