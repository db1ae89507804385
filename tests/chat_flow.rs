//! Cross-module flows: room convergence, dual-path delivery, read
//! receipts, and a fallback send reaching a live subscriber's view.

use secondact::{
    AppError,
    chat::{self, OutgoingMessage, SendTarget},
    client::Conversation,
    db,
    rooms::{self, RoomKey},
    transport::event::RoomEvent,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

async fn setup() -> (SqlitePool, broadcast::Sender<RoomEvent>) {
    let pool = db::memory_pool().await.expect("pool");
    for (id, name) in [(3, "Ada"), (7, "Grace")] {
        sqlx::query("INSERT INTO users (id,display_name) VALUES (?,?)")
            .bind(id)
            .bind(name)
            .execute(&pool)
            .await
            .expect("seed user");
    }
    sqlx::query(
        "INSERT INTO purchases (id,buyer_id,seller_id,amount_cents,status) \
         VALUES (501,3,7,120000,'paid')",
    )
    .execute(&pool)
    .await
    .expect("seed purchase");

    (pool, broadcast::channel(16).0)
}

fn outgoing(target: SendTarget, sender_id: i64, content: &str, correlation_id: &str) -> OutgoingMessage {
    OutgoingMessage {
        target,
        sender_id,
        receiver_id: None,
        content: content.to_owned(),
        correlation_id: correlation_id.to_owned(),
    }
}

#[tokio::test]
async fn direct_resolution_converges_from_both_sides() {
    let (pool, _) = setup().await;

    // Users 3 and 7 resolve the conversation independently.
    let from_buyer = rooms::resolve(&pool, &RoomKey::direct(3, 7)).await.expect("resolve");
    let from_seller = rooms::resolve(&pool, &RoomKey::direct(7, 3)).await.expect("resolve");

    assert_eq!(from_buyer.room.id, from_seller.room.id);
    assert_eq!(from_buyer.room.name, "direct_3_7");

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn purchase_read_before_any_send_creates_the_room() {
    let (pool, _) = setup().await;

    // First access is a read, not a send.
    let resolved = rooms::resolve(&pool, &RoomKey::Purchase(501)).await.expect("resolve");
    assert_eq!(resolved.room.name, "purchase_501");
    assert_eq!(resolved.participants, vec![3, 7]);

    let history = chat::store::list_messages(&pool, resolved.room.id).await.expect("list");
    assert!(history.is_empty());
}

#[tokio::test]
async fn fallback_send_reaches_a_live_subscriber_without_reload() {
    let (pool, events) = setup().await;

    // The seller is "online": subscribed to the fan-out with an open view.
    let mut inbox = events.subscribe();
    let mut seller_view = Conversation::new();

    // The buyer posts over the stateless channel.
    let delivery = chat::deliver(
        &pool,
        &events,
        outgoing(SendTarget::Key(RoomKey::Purchase(501)), 3, "is the seat still free?", "c-1"),
    )
    .await
    .expect("deliver");
    assert!(delivery.created);
    assert_eq!(delivery.message.receiver_id, Some(7));

    let RoomEvent { room_id, event } = inbox.recv().await.expect("broadcast");
    assert_eq!(room_id, delivery.message.room_id);
    seller_view.apply_event(&event);

    assert_eq!(seller_view.entries().len(), 1);
    assert_eq!(seller_view.entries()[0].content, "is the seat still free?");
    assert_eq!(seller_view.entries()[0].server_id, Some(delivery.message.id));
}

#[tokio::test]
async fn duplicate_correlation_id_persists_once_and_broadcasts_once() {
    let (pool, events) = setup().await;
    let mut inbox = events.subscribe();

    // Live path and fallback path race the same logical send.
    let first = chat::deliver(
        &pool,
        &events,
        outgoing(SendTarget::Key(RoomKey::direct(3, 7)), 3, "hello", "abc"),
    )
    .await
    .expect("deliver");
    let second = chat::deliver(
        &pool,
        &events,
        outgoing(SendTarget::Key(RoomKey::direct(3, 7)), 3, "hello", "abc"),
    )
    .await
    .expect("deliver");

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.message.id, second.message.id);

    let history = chat::store::list_messages(&pool, first.message.room_id).await.expect("list");
    assert_eq!(history.len(), 1);

    // Exactly one broadcast went out for the two attempts.
    inbox.recv().await.expect("first broadcast");
    assert!(matches!(
        inbox.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn mark_read_drains_unread_exactly_once() {
    let (pool, events) = setup().await;

    let mut room_id = 0;
    for i in 0..5 {
        let delivery = chat::deliver(
            &pool,
            &events,
            outgoing(
                SendTarget::Key(RoomKey::Purchase(501)),
                3,
                &format!("message {i}"),
                &format!("c-{i}"),
            ),
        )
        .await
        .expect("deliver");
        room_id = delivery.message.room_id;
    }

    let updated = chat::store::mark_read(&pool, room_id, 7, None).await.expect("mark read");
    assert_eq!(updated.len(), 5);

    let again = chat::store::mark_read(&pool, room_id, 7, None).await.expect("mark read");
    assert!(again.is_empty());
}

#[tokio::test]
async fn sender_outside_the_room_is_rejected() {
    let (pool, events) = setup().await;

    let err = chat::deliver(
        &pool,
        &events,
        outgoing(SendTarget::Key(RoomKey::Purchase(501)), 99, "let me in", "c-x"),
    )
    .await
    .expect_err("stranger cannot post into the purchase room");
    assert!(matches!(err, AppError::NotParticipant));
}

#[tokio::test]
async fn missing_purchase_fails_resolution() {
    let (pool, events) = setup().await;

    let err = chat::deliver(
        &pool,
        &events,
        outgoing(SendTarget::Key(RoomKey::Purchase(999)), 3, "anyone?", "c-y"),
    )
    .await
    .expect_err("no purchase, no conversation");
    assert!(matches!(err, AppError::NotFound("purchase")));
}
