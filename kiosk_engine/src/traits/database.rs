use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db_types::{OrderId, OrderStatus, ProductId, UserId},
    entities::{Order, Product, User},
    traits::ShopError,
};

/// A handle to the authoritative relational store. Cheap to clone; every logical operation opens
/// its own [`UnitOfWork`].
#[async_trait]
pub trait ShopDatabase: Clone + Send + Sync + 'static {
    type Uow: UnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, ShopError>;
}

/// A transaction-scoped view of the store.
///
/// All reads and writes inside one unit of work are sequential, and `commit` applies them
/// atomically. Dropping an uncommitted unit of work rolls it back. There is no ordering guarantee
/// *across* units of work; lost updates on the product stock counter surface from
/// [`update_product`](UnitOfWork::update_product) as [`ShopError::VersionConflict`].
#[async_trait]
pub trait UnitOfWork: Send {
    async fn fetch_user(&mut self, id: &UserId) -> Result<Option<User>, ShopError>;

    /// Reverse lookup used for referrer resolution.
    async fn fetch_user_by_telegram_id(&mut self, telegram_id: i64) -> Result<Option<User>, ShopError>;

    async fn insert_user(&mut self, user: &User) -> Result<(), ShopError>;

    async fn update_user(&mut self, user: &User) -> Result<(), ShopError>;

    async fn fetch_product(&mut self, id: &ProductId) -> Result<Option<Product>, ShopError>;

    async fn insert_product(&mut self, product: &Product) -> Result<(), ShopError>;

    /// Version-checked write. Fails with [`ShopError::VersionConflict`] when the stored row has
    /// moved on since `product` was fetched, and bumps the stored version on success.
    async fn update_product(&mut self, product: &Product) -> Result<(), ShopError>;

    async fn fetch_order(&mut self, id: &OrderId) -> Result<Option<Order>, ShopError>;

    /// Looks an order up by the payment id a gateway echoes back in its webhooks.
    async fn fetch_order_by_payment_id(&mut self, payment_id: &str) -> Result<Option<Order>, ShopError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), ShopError>;

    async fn update_order(&mut self, order: &Order) -> Result<(), ShopError>;

    /// All orders that are still `pending` but whose payment deadline lies before `now`.
    async fn fetch_expired_pending_orders(&mut self, now: DateTime<Utc>) -> Result<Vec<Order>, ShopError>;

    async fn fetch_orders_by_status(&mut self, status: OrderStatus) -> Result<Vec<Order>, ShopError>;

    async fn commit(self) -> Result<(), ShopError>;

    async fn rollback(self) -> Result<(), ShopError>;
}
