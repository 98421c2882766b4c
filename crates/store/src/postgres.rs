//! PostgreSQL store implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CartId, CouponId, OrderId, PaymentId, ProductId};
use domain::{
    Cart, CartOwner, Coupon, CouponKind, InventoryLevel, Money, Order, Payment, ProductSnapshot,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::traits::{
    CartStore, CouponStore, DeductOutcome, InventoryStore, OrderStore, PaymentStore,
    ProductCatalog, RedeemOutcome, ReserveOutcome,
};

/// PostgreSQL-backed implementation of every persistence port.
///
/// Inventory mutations take a row lock (`SELECT ... FOR UPDATE`)
/// inside a transaction; the daily order sequence and coupon
/// redemption are single conditional statements, so all three
/// contended paths are safe under concurrent checkouts.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<ProductSnapshot> {
        Ok(ProductSnapshot {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            slug: row.try_get("slug")?,
            title: row.try_get("title")?,
            artist: row.try_get("artist")?,
            format: row.try_get("format")?,
            cover_image: row.try_get("cover_image")?,
            list_price: Money::from_cents(row.try_get("list_price")?),
            sale_price: row
                .try_get::<Option<i64>, _>("sale_price")?
                .map(Money::from_cents),
        })
    }

    fn row_to_inventory(row: PgRow) -> Result<InventoryLevel> {
        Ok(InventoryLevel::from_parts(
            ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            row.try_get::<i32, _>("quantity")? as u32,
            row.try_get::<i32, _>("reserved")? as u32,
            row.try_get::<i32, _>("low_stock_threshold")? as u32,
        ))
    }

    fn row_to_coupon(row: PgRow) -> Result<Coupon> {
        let kind = match row.try_get::<&str, _>("kind")? {
            "percentage" => CouponKind::Percentage,
            _ => CouponKind::Fixed,
        };
        Ok(Coupon::from_parts(
            CouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
            row.try_get::<String, _>("code")?,
            kind,
            row.try_get("value")?,
            row.try_get::<Option<i64>, _>("min_order_amount")?
                .map(Money::from_cents),
            row.try_get::<Option<i64>, _>("max_discount_amount")?
                .map(Money::from_cents),
            row.try_get::<Option<i32>, _>("usage_limit")?.map(|v| v as u32),
            row.try_get::<i32, _>("usage_count")? as u32,
            row.try_get::<Option<DateTime<Utc>>, _>("valid_from")?,
            row.try_get::<Option<DateTime<Utc>>, _>("valid_until")?,
            row.try_get("is_active")?,
        ))
    }

    fn inventory_not_found(product_id: ProductId) -> StoreError {
        StoreError::NotFound {
            entity: "inventory",
            id: product_id.to_string(),
        }
    }
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>> {
        let row = sqlx::query(
            "SELECT id, slug, title, artist, format, cover_image, list_price, sale_price
             FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn put_product(&self, product: ProductSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, slug, title, artist, format, cover_image, list_price, sale_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                slug = EXCLUDED.slug,
                title = EXCLUDED.title,
                artist = EXCLUDED.artist,
                format = EXCLUDED.format,
                cover_image = EXCLUDED.cover_image,
                list_price = EXCLUDED.list_price,
                sale_price = EXCLUDED.sale_price
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.slug)
        .bind(&product.title)
        .bind(&product.artist)
        .bind(&product.format)
        .bind(&product.cover_image)
        .bind(product.list_price.cents())
        .bind(product.sale_price.map(|p| p.cents()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn inventory(&self, product_id: ProductId) -> Result<Option<InventoryLevel>> {
        let row = sqlx::query(
            "SELECT product_id, quantity, reserved, low_stock_threshold
             FROM inventory WHERE product_id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_inventory).transpose()
    }

    async fn put_inventory(&self, level: InventoryLevel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, quantity, reserved, low_stock_threshold)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                reserved = EXCLUDED.reserved,
                low_stock_threshold = EXCLUDED.low_stock_threshold
            "#,
        )
        .bind(level.product_id().as_uuid())
        .bind(level.quantity() as i32)
        .bind(level.reserved() as i32)
        .bind(level.low_stock_threshold() as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_reserve(&self, product_id: ProductId, qty: u32) -> Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT quantity, reserved FROM inventory WHERE product_id = $1 FOR UPDATE",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Self::inventory_not_found(product_id))?;

        let quantity = row.try_get::<i32, _>("quantity")? as u32;
        let reserved = row.try_get::<i32, _>("reserved")? as u32;
        let available = quantity.saturating_sub(reserved);

        if available < qty {
            tx.rollback().await?;
            return Ok(ReserveOutcome::Insufficient { available });
        }

        sqlx::query("UPDATE inventory SET reserved = reserved + $2 WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .bind(qty as i32)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, product_id: ProductId, qty: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE inventory SET reserved = GREATEST(reserved - $2, 0) WHERE product_id = $1",
        )
        .bind(product_id.as_uuid())
        .bind(qty as i32)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::inventory_not_found(product_id));
        }
        Ok(())
    }

    async fn try_deduct(&self, product_id: ProductId, qty: u32) -> Result<DeductOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT quantity, reserved FROM inventory WHERE product_id = $1 FOR UPDATE",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Self::inventory_not_found(product_id))?;

        let on_hand = row.try_get::<i32, _>("quantity")? as u32;
        if on_hand < qty {
            tx.rollback().await?;
            return Ok(DeductOutcome::Insufficient { on_hand });
        }

        sqlx::query(
            "UPDATE inventory
             SET quantity = quantity - $2, reserved = GREATEST(reserved - $2, 0)
             WHERE product_id = $1",
        )
        .bind(product_id.as_uuid())
        .bind(qty as i32)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DeductOutcome::Deducted)
    }

    async fn add_stock(&self, product_id: ProductId, qty: u32) -> Result<InventoryLevel> {
        let row = sqlx::query(
            "UPDATE inventory SET quantity = quantity + $2 WHERE product_id = $1
             RETURNING product_id, quantity, reserved, low_stock_threshold",
        )
        .bind(product_id.as_uuid())
        .bind(qty as i32)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Self::inventory_not_found(product_id))?;

        Self::row_to_inventory(row)
    }

    async fn set_stock(&self, product_id: ProductId, qty: u32) -> Result<InventoryLevel> {
        let row = sqlx::query(
            "UPDATE inventory SET quantity = $2 WHERE product_id = $1
             RETURNING product_id, quantity, reserved, low_stock_threshold",
        )
        .bind(product_id.as_uuid())
        .bind(qty as i32)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Self::inventory_not_found(product_id))?;

        Self::row_to_inventory(row)
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn cart_for_owner(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT body FROM carts WHERE owner_key = $1")
            .bind(owner.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body")?;
                Ok(Some(serde_json::from_value(body)?))
            }
            None => Ok(None),
        }
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let body = serde_json::to_value(cart)?;
        sqlx::query(
            r#"
            INSERT INTO carts (id, owner_key, expires_at, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                expires_at = EXCLUDED.expires_at,
                body = EXCLUDED.body
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(cart.owner().to_string())
        .bind(cart.expires_at())
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_cart(&self, id: CartId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CouponStore for PostgresStore {
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(
            "SELECT id, code, kind, value, min_order_amount, max_discount_amount,
                    usage_limit, usage_count, valid_from, valid_until, is_active
             FROM coupons WHERE code = $1",
        )
        .bind(code.to_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_coupon).transpose()
    }

    async fn put_coupon(&self, coupon: Coupon) -> Result<()> {
        let kind = match coupon.kind() {
            CouponKind::Percentage => "percentage",
            CouponKind::Fixed => "fixed",
        };
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, kind, value, min_order_amount, max_discount_amount,
                                 usage_limit, usage_count, valid_from, valid_until, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                kind = EXCLUDED.kind,
                value = EXCLUDED.value,
                min_order_amount = EXCLUDED.min_order_amount,
                max_discount_amount = EXCLUDED.max_discount_amount,
                usage_limit = EXCLUDED.usage_limit,
                usage_count = EXCLUDED.usage_count,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(coupon.id().as_uuid())
        .bind(coupon.code())
        .bind(kind)
        .bind(coupon.value())
        .bind(coupon.min_order_amount().map(|m| m.cents()))
        .bind(coupon.max_discount_amount().map(|m| m.cents()))
        .bind(coupon.usage_limit().map(|v| v as i32))
        .bind(coupon.usage_count() as i32)
        .bind(coupon.valid_from())
        .bind(coupon.valid_until())
        .bind(coupon.is_active())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_redeem(&self, id: CouponId) -> Result<RedeemOutcome> {
        // Limit check and increment are a single conditional update, so
        // concurrent redemptions cannot overrun the limit.
        let result = sqlx::query(
            "UPDATE coupons SET usage_count = usage_count + 1
             WHERE id = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(RedeemOutcome::Redeemed);
        }

        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM coupons WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Ok(RedeemOutcome::Exhausted),
            None => Err(StoreError::NotFound {
                entity: "coupon",
                id: id.to_string(),
            }),
        }
    }

    async fn release_redemption(&self, id: CouponId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE coupons SET usage_count = GREATEST(usage_count - 1, 0) WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "coupon",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let body = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, status, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number())
        .bind(order.status().as_str())
        .bind(body)
        .bind(order.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::Duplicate {
                    entity: "order",
                    id: order.order_number().to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT body FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body")?;
                Ok(Some(serde_json::from_value(body)?))
            }
            None => Ok(None),
        }
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let body = serde_json::to_value(order)?;
        let result = sqlx::query("UPDATE orders SET status = $2, body = $3 WHERE id = $1")
            .bind(order.id().as_uuid())
            .bind(order.status().as_str())
            .bind(body)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        Ok(())
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u32> {
        // Atomic upsert-increment; two same-day checkouts can never
        // read the same value.
        let seq: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (day, seq) VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET seq = order_sequences.seq + 1
            RETURNING seq
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await?;

        Ok(seq as u32)
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let body = serde_json::to_value(payment)?;
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, intent_ref, status, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.order_id().as_uuid())
        .bind(payment.intent_ref())
        .bind(payment.status().as_str())
        .bind(body)
        .bind(payment.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::Duplicate {
                    entity: "payment",
                    id: payment.intent_ref().to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT body FROM payments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body")?;
                Ok(Some(serde_json::from_value(body)?))
            }
            None => Ok(None),
        }
    }

    async fn payment_by_intent(&self, intent_ref: &str) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT body FROM payments WHERE intent_ref = $1")
            .bind(intent_ref)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body")?;
                Ok(Some(serde_json::from_value(body)?))
            }
            None => Ok(None),
        }
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows =
            sqlx::query("SELECT body FROM payments WHERE order_id = $1 ORDER BY created_at ASC")
                .bind(order_id.as_uuid())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                let body: serde_json::Value = row.try_get("body")?;
                Ok(serde_json::from_value(body)?)
            })
            .collect()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let body = serde_json::to_value(payment)?;
        let result = sqlx::query("UPDATE payments SET status = $2, body = $3 WHERE id = $1")
            .bind(payment.id().as_uuid())
            .bind(payment.status().as_str())
            .bind(body)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "payment",
                id: payment.id().to_string(),
            });
        }
        Ok(())
    }
}
