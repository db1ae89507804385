use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

// Chat-facing tables. `users`, `auth_tokens` and `purchases` belong to the
// surrounding marketplace; chat only reads them.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        display_name TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS auth_tokens (
        token TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS purchases (
        id INTEGER PRIMARY KEY,
        post_id INTEGER,
        buyer_id INTEGER NOT NULL,
        seller_id INTEGER NOT NULL,
        amount_cents INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending'
    )",
    "CREATE TABLE IF NOT EXISTS rooms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        purchase_id INTEGER,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS room_participants (
        room_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        hidden INTEGER NOT NULL DEFAULT 0,
        UNIQUE(room_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        room_id INTEGER NOT NULL,
        correlation_id TEXT NOT NULL,
        sender_id INTEGER NOT NULL,
        receiver_id INTEGER,
        purchase_id INTEGER,
        content TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        UNIQUE(room_id, correlation_id)
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
];

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

/// Wall-clock in unix milliseconds; used for row and wire timestamps.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// In-memory database with the schema applied. A single connection keeps
/// every caller on the same `:memory:` instance.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}
