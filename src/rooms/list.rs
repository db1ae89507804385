use axum::{Json, debug_handler, extract::{Path, State}};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    AppResult,
    chat::wire::{string_id, string_id_opt},
    error::AppError,
    session::CurrentUser,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(with = "string_id")]
    pub id: i64,
    pub name: String,
    #[serde(default, with = "string_id_opt")]
    pub purchase_id: Option<i64>,
    /// Deal amount for purchase-linked rooms, in cents.
    #[serde(default, with = "string_id_opt")]
    pub amount_cents: Option<i64>,
    pub unread: i64,
}

/// The caller's visible conversations. Rooms the caller left stay in the
/// directory but are filtered out here.
#[debug_handler(state = crate::AppState)]
pub async fn list_rooms(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<Vec<RoomSummary>>> {
    let rows: Vec<(i64, String, Option<i64>, Option<i64>, i64)> = sqlx::query_as(
        "SELECT r.id, r.name, r.purchase_id, pu.amount_cents, \
           (SELECT COUNT(*) FROM messages m \
             WHERE m.room_id=r.id AND m.receiver_id=? AND m.is_read=0) \
         FROM rooms r \
         JOIN room_participants p ON p.room_id=r.id \
         LEFT JOIN purchases pu ON pu.id=r.purchase_id \
         WHERE p.user_id=? AND p.hidden=0 \
         ORDER BY r.created_at DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(id, name, purchase_id, amount_cents, unread)| RoomSummary {
                id,
                name,
                purchase_id,
                amount_cents,
                unread,
            })
            .collect(),
    ))
}

/// Soft leave: the room is flagged invisible to the caller, never deleted.
#[debug_handler(state = crate::AppState)]
pub async fn leave_room(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query("UPDATE room_participants SET hidden=1 WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .execute(&db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("room"));
    }
    Ok(Json(serde_json::json!({ "left": true })))
}
