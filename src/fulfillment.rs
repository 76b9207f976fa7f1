//! Port to the shop side: handing out and revoking the purchased product.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::error::AppError;

/// Grants or revokes access to the purchased product. The payment lifecycle
/// only cares about the resulting order id.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Delivers the product to the customer and returns the shop order id
    /// created for it. Must be idempotent per (user, product).
    async fn deliver(&self, user_id: i64, product_id: i64) -> Result<i64, AppError>;

    /// Takes the product away again (full refund, instalment cancellation).
    async fn revoke(&self, user_id: i64, product_id: i64) -> Result<(), AppError>;
}

/// Default catalog keeping delivered orders in an own table. Shops with their
/// own order management replace this with an adapter to it.
#[derive(Clone)]
pub struct OrderLedger {
    pool: PgPool,
}

impl OrderLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for OrderLedger {
    async fn deliver(&self, user_id: i64, product_id: i64) -> Result<i64, AppError> {
        // Re-delivery after a revocation reactivates the same order.
        let (order_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO nn_orders (user_id, product_id, revoked, created_at)
            VALUES ($1, $2, false, now())
            ON CONFLICT (user_id, product_id) DO UPDATE SET revoked = false
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        info!(user_id, product_id, order_id, "product delivered");
        Ok(order_id)
    }

    async fn revoke(&self, user_id: i64, product_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE nn_orders SET revoked = true WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        info!(user_id, product_id, "product access revoked");
        Ok(())
    }
}
