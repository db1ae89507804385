//! Read-only surface of the marketplace's purchase workflow. Chat needs the
//! two sides of a transaction to place them in its room; everything else
//! about the purchase lifecycle lives elsewhere.

use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Purchase {
    pub id: i64,
    pub post_id: Option<i64>,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub amount_cents: i64,
    pub status: String,
}

impl Purchase {
    pub fn counterpart(&self, user_id: i64) -> Option<i64> {
        if user_id == self.buyer_id {
            Some(self.seller_id)
        } else if user_id == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }
}

pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Purchase>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id,post_id,buyer_id,seller_id,amount_cents,status FROM purchases WHERE id=?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
