//! Identity resolution. Token issuance and login flows are the
//! marketplace's concern; both chat channels only ever ask "whose token is
//! this" against the same table.

use sqlx::SqlitePool;

use crate::AppResult;

#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: i64,
    pub display_name: String,
}

pub async fn resolve_token(pool: &SqlitePool, token: &str) -> AppResult<Option<AuthedUser>> {
    let row: Option<(i64, Option<String>)> = sqlx::query_as(
        "SELECT t.user_id, u.display_name FROM auth_tokens t \
         LEFT JOIN users u ON u.id=t.user_id WHERE t.token=?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, display_name)| AuthedUser {
        id,
        display_name: display_name.unwrap_or_default(),
    }))
}

pub async fn load_profile(pool: &SqlitePool, user_id: i64) -> AppResult<AuthedUser> {
    let row: Option<(String,)> = sqlx::query_as("SELECT display_name FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(AuthedUser {
        id: user_id,
        display_name: row.map(|(name,)| name).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let pool = db::memory_pool().await.expect("pool");
        sqlx::query("INSERT INTO users (id,display_name) VALUES (3,'Ada')")
            .execute(&pool)
            .await
            .expect("seed user");
        sqlx::query("INSERT INTO auth_tokens (token,user_id) VALUES ('tok-3',3)")
            .execute(&pool)
            .await
            .expect("seed token");

        let user = resolve_token(&pool, "tok-3").await.expect("query");
        assert_eq!(user.as_ref().map(|u| u.id), Some(3));
        assert_eq!(user.map(|u| u.display_name), Some("Ada".to_owned()));

        assert!(resolve_token(&pool, "nope").await.expect("query").is_none());
    }
}
