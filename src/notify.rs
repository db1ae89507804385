use sqlx::SqlitePool;

use crate::{chat::store::StoredMessage, db};

const SNIPPET_LEN: usize = 120;

/// Fire-and-forget notification for the receiver of a fresh message.
/// Failures are logged and swallowed; delivery never depends on this.
pub fn message_created(pool: SqlitePool, receiver_id: i64, message: &StoredMessage) {
    let body = snippet(&message.content);
    tokio::spawn(async move {
        let result = sqlx::query(
            "INSERT INTO notifications (user_id,kind,body,created_at) VALUES (?,?,?,?)",
        )
        .bind(receiver_id)
        .bind("chat_message")
        .bind(body)
        .bind(db::now_ms())
        .execute(&pool)
        .await;
        if let Err(err) = result {
            tracing::warn!(receiver_id, error = %err, "failed to raise chat notification");
        }
    });
}

fn snippet(content: &str) -> String {
    let mut out: String = content.chars().take(SNIPPET_LEN).collect();
    if content.chars().count() > SNIPPET_LEN {
        out.push('…');
    }
    out
}
