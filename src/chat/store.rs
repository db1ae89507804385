use sqlx::SqlitePool;

use crate::{AppResult, db, error::AppError};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub room_id: i64,
    pub correlation_id: String,
    pub sender_id: i64,
    pub receiver_id: Option<i64>,
    pub purchase_id: Option<i64>,
    pub content: String,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug)]
pub struct NewMessage<'a> {
    pub room_id: i64,
    pub correlation_id: &'a str,
    pub sender_id: i64,
    pub receiver_id: Option<i64>,
    pub purchase_id: Option<i64>,
    pub content: &'a str,
}

const SELECT_COLUMNS: &str =
    "id,room_id,correlation_id,sender_id,receiver_id,purchase_id,content,is_read,created_at";

/// Persist a message at most once per (room, correlation id). When the row
/// already exists — the live and fallback paths raced on the same logical
/// send — the existing row is returned and `created` is false, so both
/// paths acknowledge the same server id.
pub async fn insert_message(
    pool: &SqlitePool,
    msg: NewMessage<'_>,
) -> AppResult<(StoredMessage, bool)> {
    let created_at = db::now_ms();
    let result = sqlx::query(
        "INSERT INTO messages (room_id,correlation_id,sender_id,receiver_id,purchase_id,content,created_at) \
         VALUES (?,?,?,?,?,?,?) ON CONFLICT(room_id,correlation_id) DO NOTHING",
    )
    .bind(msg.room_id)
    .bind(msg.correlation_id)
    .bind(msg.sender_id)
    .bind(msg.receiver_id)
    .bind(msg.purchase_id)
    .bind(msg.content)
    .bind(created_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let existing = find_by_correlation(pool, msg.room_id, msg.correlation_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        return Ok((existing, false));
    }

    Ok((
        StoredMessage {
            id: result.last_insert_rowid(),
            room_id: msg.room_id,
            correlation_id: msg.correlation_id.to_owned(),
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            purchase_id: msg.purchase_id,
            content: msg.content.to_owned(),
            is_read: false,
            created_at,
        },
        true,
    ))
}

pub async fn find_by_correlation(
    pool: &SqlitePool,
    room_id: i64,
    correlation_id: &str,
) -> Result<Option<StoredMessage>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {SELECT_COLUMNS} FROM messages WHERE room_id=? AND correlation_id=?"
    ))
    .bind(room_id)
    .bind(correlation_id)
    .fetch_optional(pool)
    .await
}

/// Room history in creation order. Ties on the millisecond clock fall back
/// to insert order.
pub async fn list_messages(pool: &SqlitePool, room_id: i64) -> AppResult<Vec<StoredMessage>> {
    let rows = sqlx::query_as(&format!(
        "SELECT {SELECT_COLUMNS} FROM messages WHERE room_id=? ORDER BY created_at,id"
    ))
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Batched false→true read transition scoped to (room, receiver). Only the
/// receiver's own unread messages move; repeated calls update nothing.
pub async fn mark_read(
    pool: &SqlitePool,
    room_id: i64,
    receiver_id: i64,
    only_message: Option<i64>,
) -> AppResult<Vec<i64>> {
    let rows: Vec<(i64,)> = match only_message {
        Some(message_id) => {
            sqlx::query_as(
                "UPDATE messages SET is_read=1 \
                 WHERE room_id=? AND receiver_id=? AND is_read=0 AND id=? RETURNING id",
            )
            .bind(room_id)
            .bind(receiver_id)
            .bind(message_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "UPDATE messages SET is_read=1 \
                 WHERE room_id=? AND receiver_id=? AND is_read=0 RETURNING id",
            )
            .bind(room_id)
            .bind(receiver_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn room(pool: &SqlitePool) -> i64 {
        let result = sqlx::query("INSERT INTO rooms (name,created_at) VALUES ('direct_3_7',0)")
            .execute(pool)
            .await
            .expect("insert room");
        result.last_insert_rowid()
    }

    fn new_message<'a>(room_id: i64, correlation_id: &'a str, content: &'a str) -> NewMessage<'a> {
        NewMessage {
            room_id,
            correlation_id,
            sender_id: 3,
            receiver_id: Some(7),
            purchase_id: None,
            content,
        }
    }

    #[tokio::test]
    async fn inserts_at_most_once_per_correlation_id() {
        let pool = db::memory_pool().await.expect("pool");
        let room_id = room(&pool).await;

        let (first, created) = insert_message(&pool, new_message(room_id, "abc", "hello"))
            .await
            .expect("insert");
        assert!(created);

        let (second, created) = insert_message(&pool, new_message(room_id, "abc", "hello"))
            .await
            .expect("duplicate insert");
        assert!(!created);
        assert_eq!(second.id, first.id);

        let history = list_messages(&pool, room_id).await.expect("list");
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn lists_in_creation_order() {
        let pool = db::memory_pool().await.expect("pool");
        let room_id = room(&pool).await;

        for i in 0..3 {
            let correlation_id = format!("c-{i}");
            let content = format!("msg {i}");
            insert_message(&pool, new_message(room_id, &correlation_id, &content))
                .await
                .expect("insert");
        }

        let history = list_messages(&pool, room_id).await.expect("list");
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2"]);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_receiver_scoped() {
        let pool = db::memory_pool().await.expect("pool");
        let room_id = room(&pool).await;

        for i in 0..5 {
            let correlation_id = format!("r-{i}");
            insert_message(&pool, new_message(room_id, &correlation_id, "unread"))
                .await
                .expect("insert");
        }
        // A message addressed to someone else must not be touched.
        insert_message(
            &pool,
            NewMessage {
                receiver_id: Some(3),
                ..new_message(room_id, "other", "for the buyer")
            },
        )
        .await
        .expect("insert");

        let updated = mark_read(&pool, room_id, 7, None).await.expect("mark read");
        assert_eq!(updated.len(), 5);

        let again = mark_read(&pool, room_id, 7, None).await.expect("mark read");
        assert!(again.is_empty());

        let (unread_for_3,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE room_id=? AND receiver_id=3 AND is_read=0",
        )
        .bind(room_id)
        .fetch_one(&pool)
        .await
        .expect("count");
        assert_eq!(unread_for_3, 1);
    }

    #[tokio::test]
    async fn mark_read_can_target_a_single_message() {
        let pool = db::memory_pool().await.expect("pool");
        let room_id = room(&pool).await;

        let (first, _) = insert_message(&pool, new_message(room_id, "one", "a"))
            .await
            .expect("insert");
        insert_message(&pool, new_message(room_id, "two", "b"))
            .await
            .expect("insert");

        let updated = mark_read(&pool, room_id, 7, Some(first.id))
            .await
            .expect("mark read");
        assert_eq!(updated, vec![first.id]);
    }
}
