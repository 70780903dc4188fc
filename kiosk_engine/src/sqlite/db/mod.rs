//! Low-level SQLite interactions.
//!
//! Plain functions over a `&mut SqliteConnection` rather than stateful structs, so callers can
//! run them against a pooled connection or embed them in a transaction by passing `&mut *tx`.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod orders;
pub mod products;
pub mod users;

const SQLITE_DB_URL: &str = "sqlite://data/kiosk.db";

pub fn db_url() -> String {
    let result = env::var("KIOSK_DATABASE_URL").unwrap_or_else(|_| {
        info!("KIOSK_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Decode helper for columns stored as strings (statuses, currencies, payment methods).
pub(crate) fn decode_err(
    column: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> SqlxError {
    SqlxError::ColumnDecode { index: column.to_string(), source: Box::new(source) }
}
