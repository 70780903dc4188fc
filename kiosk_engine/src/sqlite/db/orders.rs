use chrono::{DateTime, Utc};
use kiosk_common::{Currency, Money};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db_types::{OrderId, OrderStatus, PaymentMethod},
    entities::Order,
    sqlite::db::decode_err,
};

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let code: String = row.try_get("currency")?;
        let currency = code.parse::<Currency>().map_err(|e| decode_err("currency", e))?;
        let amount = Money::from_cents(row.try_get("amount_cents")?, currency).map_err(|e| decode_err("amount_cents", e))?;
        let status: String = row.try_get("status")?;
        let status = status.parse::<OrderStatus>().map_err(|e| decode_err("status", e))?;
        let payment_method = row
            .try_get::<Option<String>, _>("payment_method")?
            .map(|m| m.parse::<PaymentMethod>())
            .transpose()
            .map_err(|e| decode_err("payment_method", e))?;
        let mut order = Order::from_parts(
            row.try_get::<String, _>("id")?.into(),
            row.try_get::<String, _>("user_id")?.into(),
            row.try_get::<String, _>("product_id")?.into(),
            amount,
            row.try_get("quantity")?,
            status,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        );
        order.payment_method = payment_method;
        order.payment_id = row.try_get("payment_id")?;
        order.external_payment_id = row.try_get("external_payment_id")?;
        order.payment_url = row.try_get("payment_url")?;
        order.expires_at = row.try_get("expires_at")?;
        order.paid_at = row.try_get("paid_at")?;
        order.completed_at = row.try_get("completed_at")?;
        order.cancelled_at = row.try_get("cancelled_at")?;
        order.notes = row.try_get("notes")?;
        order.referrer_id = row.try_get::<Option<String>, _>("referrer_id")?.map(Into::into);
        order.promocode = row.try_get("promocode")?;
        order.is_trial = row.try_get("is_trial")?;
        order.is_extend = row.try_get("is_extend")?;
        Ok(order)
    }
}

pub async fn fetch_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_order_by_payment_id(
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE payment_id = $1").bind(payment_id).fetch_optional(conn).await
}

pub async fn insert_order(order: &Order, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, user_id, product_id, amount_cents, currency, quantity, status,
            payment_method, payment_id, external_payment_id, payment_url,
            expires_at, paid_at, completed_at, cancelled_at,
            notes, referrer_id, promocode, is_trial, is_extend,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
        "#,
    )
    .bind(order.id.as_str())
    .bind(order.user_id.as_str())
    .bind(order.product_id.as_str())
    .bind(order.amount.cents())
    .bind(order.amount.currency().as_str().to_string())
    .bind(order.quantity)
    .bind(order.status.to_string())
    .bind(order.payment_method.map(|m| m.to_string()))
    .bind(&order.payment_id)
    .bind(&order.external_payment_id)
    .bind(&order.payment_url)
    .bind(order.expires_at)
    .bind(order.paid_at)
    .bind(order.completed_at)
    .bind(order.cancelled_at)
    .bind(&order.notes)
    .bind(order.referrer_id.as_ref().map(|id| id.as_str().to_string()))
    .bind(&order.promocode)
    .bind(order.is_trial)
    .bind(order.is_extend)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_order(order: &Order, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = $2,
            payment_method = $3,
            payment_id = $4,
            external_payment_id = $5,
            payment_url = $6,
            expires_at = $7,
            paid_at = $8,
            completed_at = $9,
            cancelled_at = $10,
            notes = $11,
            updated_at = $12
        WHERE id = $1
        "#,
    )
    .bind(order.id.as_str())
    .bind(order.status.to_string())
    .bind(order.payment_method.map(|m| m.to_string()))
    .bind(&order.payment_id)
    .bind(&order.external_payment_id)
    .bind(&order.payment_url)
    .bind(order.expires_at)
    .bind(order.paid_at)
    .bind(order.completed_at)
    .bind(order.cancelled_at)
    .bind(&order.notes)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Orders still `pending` whose payment deadline lies before `now`, oldest first.
pub async fn fetch_expired_pending_orders(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM orders
        WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at < $1
        ORDER BY expires_at ASC
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await
}

pub async fn fetch_orders_by_status(
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE status = $1 ORDER BY created_at ASC")
        .bind(status.to_string())
        .fetch_all(conn)
        .await
}
