use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db_types::{OrderId, OrderStatus, ProductId, UserId},
    entities::{Order, Product, User},
    traits::{ShopDatabase, ShopError, UnitOfWork},
};

#[derive(Default)]
struct Store {
    users: HashMap<UserId, User>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
}

/// An in-memory [`ShopDatabase`] with the same transactional semantics as the SQLite backend:
/// writes are staged per unit of work and applied on commit, and `update_product` performs the
/// version check eagerly, bumping the version on success.
///
/// [`induce_product_conflicts`](Self::induce_product_conflicts) makes the next N product writes
/// fail with [`ShopError::VersionConflict`], for exercising the retry path.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    store: Arc<Mutex<Store>>,
    induced_conflicts: Arc<AtomicU32>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user directly, outside any unit of work.
    pub fn add_user(&self, user: User) {
        self.store.lock().unwrap().users.insert(user.id.clone(), user);
    }

    pub fn add_product(&self, product: Product) {
        self.store.lock().unwrap().products.insert(product.id.clone(), product);
    }

    pub fn add_order(&self, order: Order) {
        self.store.lock().unwrap().orders.insert(order.id.clone(), order);
    }

    pub fn user(&self, id: &UserId) -> Option<User> {
        self.store.lock().unwrap().users.get(id).cloned()
    }

    pub fn product(&self, id: &ProductId) -> Option<Product> {
        self.store.lock().unwrap().products.get(id).cloned()
    }

    pub fn order(&self, id: &OrderId) -> Option<Order> {
        self.store.lock().unwrap().orders.get(id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.store.lock().unwrap().orders.len()
    }

    /// The next `n` product writes fail with a version conflict before any check is made.
    pub fn induce_product_conflicts(&self, n: u32) {
        self.induced_conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ShopDatabase for MemoryDatabase {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, ShopError> {
        Ok(MemoryUnitOfWork { db: self.clone(), staged: Vec::new() })
    }
}

enum Write {
    User(User),
    Product(Product),
    Order(Order),
}

pub struct MemoryUnitOfWork {
    db: MemoryDatabase,
    staged: Vec<Write>,
}

impl MemoryUnitOfWork {
    fn staged_user(&self, id: &UserId) -> Option<User> {
        self.staged
            .iter()
            .rev()
            .find_map(|w| match w {
                Write::User(u) if &u.id == id => Some(u.clone()),
                _ => None,
            })
    }

    fn staged_product(&self, id: &ProductId) -> Option<Product> {
        self.staged
            .iter()
            .rev()
            .find_map(|w| match w {
                Write::Product(p) if &p.id == id => Some(p.clone()),
                _ => None,
            })
    }

    fn staged_order(&self, id: &OrderId) -> Option<Order> {
        self.staged
            .iter()
            .rev()
            .find_map(|w| match w {
                Write::Order(o) if &o.id == id => Some(o.clone()),
                _ => None,
            })
    }

    // Pending domain events never belong in the store
    fn strip_events(mut order: Order) -> Order {
        order.take_events();
        order
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn fetch_user(&mut self, id: &UserId) -> Result<Option<User>, ShopError> {
        if let Some(user) = self.staged_user(id) {
            return Ok(Some(user));
        }
        Ok(self.db.user(id))
    }

    async fn fetch_user_by_telegram_id(&mut self, telegram_id: i64) -> Result<Option<User>, ShopError> {
        let store = self.db.store.lock().unwrap();
        Ok(store.users.values().find(|u| u.telegram_id == Some(telegram_id)).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), ShopError> {
        self.staged.push(Write::User(user.clone()));
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), ShopError> {
        if self.staged_user(&user.id).is_none() && self.db.user(&user.id).is_none() {
            return Err(ShopError::not_found("user", user.id.as_str()));
        }
        self.staged.push(Write::User(user.clone()));
        Ok(())
    }

    async fn fetch_product(&mut self, id: &ProductId) -> Result<Option<Product>, ShopError> {
        if let Some(product) = self.staged_product(id) {
            return Ok(Some(product));
        }
        Ok(self.db.product(id))
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), ShopError> {
        self.staged.push(Write::Product(product.clone()));
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), ShopError> {
        let conflicts = &self.db.induced_conflicts;
        if conflicts.load(Ordering::SeqCst) > 0 {
            conflicts.fetch_sub(1, Ordering::SeqCst);
            return Err(ShopError::VersionConflict { kind: "product", id: product.id.to_string() });
        }
        let current = self
            .staged_product(&product.id)
            .or_else(|| self.db.product(&product.id))
            .ok_or_else(|| ShopError::not_found("product", product.id.as_str()))?;
        if current.version != product.version {
            return Err(ShopError::VersionConflict { kind: "product", id: product.id.to_string() });
        }
        let mut bumped = product.clone();
        bumped.version += 1;
        self.staged.push(Write::Product(bumped));
        Ok(())
    }

    async fn fetch_order(&mut self, id: &OrderId) -> Result<Option<Order>, ShopError> {
        if let Some(order) = self.staged_order(id) {
            return Ok(Some(order));
        }
        Ok(self.db.order(id))
    }

    async fn fetch_order_by_payment_id(&mut self, payment_id: &str) -> Result<Option<Order>, ShopError> {
        let store = self.db.store.lock().unwrap();
        Ok(store.orders.values().find(|o| o.payment_id.as_deref() == Some(payment_id)).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), ShopError> {
        self.staged.push(Write::Order(Self::strip_events(order.clone())));
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), ShopError> {
        if self.staged_order(&order.id).is_none() && self.db.order(&order.id).is_none() {
            return Err(ShopError::not_found("order", order.id.as_str()));
        }
        self.staged.push(Write::Order(Self::strip_events(order.clone())));
        Ok(())
    }

    async fn fetch_expired_pending_orders(&mut self, now: DateTime<Utc>) -> Result<Vec<Order>, ShopError> {
        let store = self.db.store.lock().unwrap();
        let mut expired: Vec<Order> = store
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by_key(|o| o.expires_at);
        Ok(expired)
    }

    async fn fetch_orders_by_status(&mut self, status: OrderStatus) -> Result<Vec<Order>, ShopError> {
        let store = self.db.store.lock().unwrap();
        let mut orders: Vec<Order> = store.orders.values().filter(|o| o.status == status).cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn commit(self) -> Result<(), ShopError> {
        let mut store = self.db.store.lock().unwrap();
        for write in self.staged {
            match write {
                Write::User(u) => {
                    store.users.insert(u.id.clone(), u);
                },
                Write::Product(p) => {
                    store.products.insert(p.id.clone(), p);
                },
                Write::Order(o) => {
                    store.orders.insert(o.id.clone(), o);
                },
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), ShopError> {
        Ok(())
    }
}
