use sqlx::SqlitePool;

use crate::{
    AppResult, db,
    error::{AppError, is_unique_violation},
    purchases,
};

use super::{ResolvedRoom, Room, RoomKey};

/// Resolve a conversation key to its room, creating the room on first
/// access. Two resolvers racing on the same key converge on one row: the
/// loser of the insert race re-queries by name and uses the winner's room.
/// The expected participant set is re-checked and backfilled on every call,
/// so rooms created by one side heal once the counterpart shows up.
pub async fn resolve(pool: &SqlitePool, key: &RoomKey) -> AppResult<ResolvedRoom> {
    let expected = expected_participants(pool, key).await?;
    let name = key.name();

    let room = match find_by_name(pool, &name).await? {
        Some(room) => room,
        None => create_or_requery(pool, key, &name).await?,
    };

    for &user_id in &expected {
        sqlx::query("INSERT OR IGNORE INTO room_participants (room_id,user_id) VALUES (?,?)")
            .bind(room.id)
            .bind(user_id)
            .execute(pool)
            .await?;
    }

    let participants = participant_ids(pool, room.id).await?;
    Ok(ResolvedRoom { room, participants })
}

/// Resolve by room id (the live channel's send path, where the room was
/// already joined). Re-derives the conversation key so the participant
/// backfill runs on this access too.
pub async fn load_room(pool: &SqlitePool, room_id: i64) -> AppResult<ResolvedRoom> {
    let room: Option<Room> =
        sqlx::query_as("SELECT id,name,purchase_id,created_at FROM rooms WHERE id=?")
            .bind(room_id)
            .fetch_optional(pool)
            .await?;
    let room = room.ok_or(AppError::NotFound("room"))?;
    let key = room.key()?;
    resolve(pool, &key).await
}

async fn expected_participants(pool: &SqlitePool, key: &RoomKey) -> AppResult<Vec<i64>> {
    match key {
        RoomKey::Purchase(purchase_id) => {
            let purchase = purchases::find(pool, *purchase_id)
                .await?
                .ok_or(AppError::NotFound("purchase"))?;
            Ok(vec![purchase.buyer_id, purchase.seller_id])
        }
        RoomKey::Direct(lo, hi) => {
            if lo == hi {
                return Err(AppError::Invalid("cannot open a conversation with yourself"));
            }
            Ok(vec![*lo, *hi])
        }
    }
}

async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Room>, sqlx::Error> {
    sqlx::query_as("SELECT id,name,purchase_id,created_at FROM rooms WHERE name=?")
        .bind(name)
        .fetch_optional(pool)
        .await
}

async fn create_or_requery(pool: &SqlitePool, key: &RoomKey, name: &str) -> AppResult<Room> {
    let created_at = db::now_ms();
    let inserted = sqlx::query("INSERT INTO rooms (name,purchase_id,created_at) VALUES (?,?,?)")
        .bind(name)
        .bind(key.purchase_id())
        .bind(created_at)
        .execute(pool)
        .await;

    match inserted {
        Ok(result) => Ok(Room {
            id: result.last_insert_rowid(),
            name: name.to_owned(),
            purchase_id: key.purchase_id(),
            created_at,
        }),
        // A concurrent resolver won the race; its row is the room.
        Err(err) if is_unique_violation(&err) => find_by_name(pool, name)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("room '{name}' vanished after insert conflict"))),
        Err(err) => Err(err.into()),
    }
}

async fn participant_ids(pool: &SqlitePool, room_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT user_id FROM room_participants WHERE room_id=? ORDER BY user_id")
            .bind(room_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Participant set with display names, for room-joined payloads.
pub async fn load_participants(
    pool: &SqlitePool,
    room_id: i64,
) -> AppResult<Vec<crate::chat::wire::ParticipantDto>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT p.user_id, COALESCE(u.display_name,'') \
         FROM room_participants p LEFT JOIN users u ON u.id=p.user_id \
         WHERE p.room_id=? ORDER BY p.user_id",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(user_id, display_name)| crate::chat::wire::ParticipantDto {
            user_id,
            display_name,
        })
        .collect())
}
