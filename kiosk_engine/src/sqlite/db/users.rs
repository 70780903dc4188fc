use chrono::Utc;
use kiosk_common::{Currency, Money};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{db_types::UserId, entities::User, sqlite::db::decode_err};

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let total_spent = match row.try_get::<Option<i64>, _>("total_spent_cents")? {
            Some(cents) => {
                let code: String = row.try_get("total_spent_currency")?;
                let currency = code.parse::<Currency>().map_err(|e| decode_err("total_spent_currency", e))?;
                Some(Money::from_cents(cents, currency).map_err(|e| decode_err("total_spent_cents", e))?)
            },
            None => None,
        };
        Ok(User {
            id: row.try_get::<String, _>("id")?.into(),
            telegram_id: row.try_get("telegram_id")?,
            username: row.try_get("username")?,
            subscription_until: row.try_get("subscription_until")?,
            total_spent,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub async fn fetch_user(id: &UserId, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_user_by_telegram_id(
    telegram_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE telegram_id = $1").bind(telegram_id).fetch_optional(conn).await
}

pub async fn insert_user(user: &User, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (
            id, telegram_id, username, subscription_until, total_spent_cents, total_spent_currency,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(user.id.as_str())
    .bind(user.telegram_id)
    .bind(&user.username)
    .bind(user.subscription_until)
    .bind(user.total_spent.map(|m| m.cents()))
    .bind(user.total_spent.map(|m| m.currency().as_str().to_string()))
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_user(user: &User, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users SET
            telegram_id = $2,
            username = $3,
            subscription_until = $4,
            total_spent_cents = $5,
            total_spent_currency = $6,
            updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(user.id.as_str())
    .bind(user.telegram_id)
    .bind(&user.username)
    .bind(user.subscription_until)
    .bind(user.total_spent.map(|m| m.cents()))
    .bind(user.total_spent.map(|m| m.currency().as_str().to_string()))
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
