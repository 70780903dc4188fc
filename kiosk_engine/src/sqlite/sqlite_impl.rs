//! `SqliteDatabase` implements [`ShopDatabase`] over a SQLite pool; each [`SqliteUnitOfWork`]
//! wraps one transaction.
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{
    db_types::{OrderId, OrderStatus, ProductId, UserId},
    entities::{Order, Product, User},
    sqlite::db::{new_pool, orders, products, users},
    traits::{ShopDatabase, ShopError, UnitOfWork},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, ShopError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), ShopError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ShopError::Database(e.to_string()))
    }
}

#[async_trait]
impl ShopDatabase for SqliteDatabase {
    type Uow = SqliteUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, ShopError> {
        let tx = self.pool.begin().await?;
        Ok(SqliteUnitOfWork { tx })
    }
}

pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn fetch_user(&mut self, id: &UserId) -> Result<Option<User>, ShopError> {
        Ok(users::fetch_user(id, &mut *self.tx).await?)
    }

    async fn fetch_user_by_telegram_id(&mut self, telegram_id: i64) -> Result<Option<User>, ShopError> {
        Ok(users::fetch_user_by_telegram_id(telegram_id, &mut *self.tx).await?)
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), ShopError> {
        Ok(users::insert_user(user, &mut *self.tx).await?)
    }

    async fn update_user(&mut self, user: &User) -> Result<(), ShopError> {
        let n = users::update_user(user, &mut *self.tx).await?;
        if n == 0 {
            return Err(ShopError::not_found("user", user.id.as_str()));
        }
        Ok(())
    }

    async fn fetch_product(&mut self, id: &ProductId) -> Result<Option<Product>, ShopError> {
        Ok(products::fetch_product(id, &mut *self.tx).await?)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), ShopError> {
        Ok(products::insert_product(product, &mut *self.tx).await?)
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), ShopError> {
        let n = products::update_product(product, &mut *self.tx).await?;
        if n == 0 {
            return Err(ShopError::VersionConflict { kind: "product", id: product.id.to_string() });
        }
        Ok(())
    }

    async fn fetch_order(&mut self, id: &OrderId) -> Result<Option<Order>, ShopError> {
        Ok(orders::fetch_order(id, &mut *self.tx).await?)
    }

    async fn fetch_order_by_payment_id(&mut self, payment_id: &str) -> Result<Option<Order>, ShopError> {
        Ok(orders::fetch_order_by_payment_id(payment_id, &mut *self.tx).await?)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), ShopError> {
        Ok(orders::insert_order(order, &mut *self.tx).await?)
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), ShopError> {
        let n = orders::update_order(order, &mut *self.tx).await?;
        if n == 0 {
            return Err(ShopError::not_found("order", order.id.as_str()));
        }
        Ok(())
    }

    async fn fetch_expired_pending_orders(&mut self, now: DateTime<Utc>) -> Result<Vec<Order>, ShopError> {
        Ok(orders::fetch_expired_pending_orders(now, &mut *self.tx).await?)
    }

    async fn fetch_orders_by_status(&mut self, status: OrderStatus) -> Result<Vec<Order>, ShopError> {
        Ok(orders::fetch_orders_by_status(status, &mut *self.tx).await?)
    }

    async fn commit(self) -> Result<(), ShopError> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self) -> Result<(), ShopError> {
        Ok(self.tx.rollback().await?)
    }
}
