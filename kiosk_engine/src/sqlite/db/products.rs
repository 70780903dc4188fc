use chrono::Utc;
use kiosk_common::{Currency, Money};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db_types::{ProductId, ProductStatus},
    entities::Product,
    sqlite::db::decode_err,
};

impl FromRow<'_, SqliteRow> for Product {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let code: String = row.try_get("currency")?;
        let currency = code.parse::<Currency>().map_err(|e| decode_err("currency", e))?;
        let price = Money::from_cents(row.try_get("price_cents")?, currency).map_err(|e| decode_err("price_cents", e))?;
        let status: String = row.try_get("status")?;
        Ok(Product {
            id: row.try_get::<String, _>("id")?.into(),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price,
            duration_days: row.try_get("duration_days")?,
            stock: row.try_get("stock")?,
            status: status.parse::<ProductStatus>().map_err(|e| decode_err("status", e))?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub async fn fetch_product(id: &ProductId, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await
}

pub async fn insert_product(product: &Product, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, description, price_cents, currency, duration_days, stock, status, version,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(product.id.as_str())
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price.cents())
    .bind(product.price.currency().as_str().to_string())
    .bind(product.duration_days)
    .bind(product.stock)
    .bind(product.status.to_string())
    .bind(product.version)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Version-checked write. Touches zero rows when the stored version no longer matches the one the
/// caller read, which the caller must treat as a lost update.
pub async fn update_product(product: &Product, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE products SET
            name = $2,
            description = $3,
            price_cents = $4,
            currency = $5,
            duration_days = $6,
            stock = $7,
            status = $8,
            version = version + 1,
            updated_at = $9
        WHERE id = $1 AND version = $10
        "#,
    )
    .bind(product.id.as_str())
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price.cents())
    .bind(product.price.currency().as_str().to_string())
    .bind(product.duration_days)
    .bind(product.stock)
    .bind(product.status.to_string())
    .bind(Utc::now())
    .bind(product.version)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
