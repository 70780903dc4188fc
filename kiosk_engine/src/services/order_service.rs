use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{OrderId, OrderStatus, PaymentMethod, ProductId, UserId},
    entities::{NewOrder, Order, Product, DEFAULT_PAYMENT_WINDOW_MINUTES},
    events::EventPublisher,
    traits::{ShopDatabase, ShopError, UnitOfWork},
};

/// The sweep works through expired orders in bounded batches this size.
const SWEEP_BATCH_SIZE: usize = 10;

/// How the caller identifies a referrer: directly, or by the external telegram id that needs a
/// reverse lookup.
#[derive(Debug, Clone)]
pub enum Referrer {
    Id(UserId),
    TelegramId(i64),
}

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub referrer: Option<Referrer>,
    pub promocode: Option<String>,
    pub is_trial: bool,
    pub is_extend: bool,
}

impl CreateOrderRequest {
    pub fn new(user_id: UserId, product_id: ProductId, quantity: i64) -> Self {
        Self {
            user_id,
            product_id,
            quantity,
            payment_method: None,
            notes: None,
            referrer: None,
            promocode: None,
            is_trial: false,
            is_extend: false,
        }
    }
}

/// Aggregated result of one expiration sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub expired: usize,
    pub skipped: usize,
    pub failures: usize,
}

/// Orchestrates the order lifecycle.
///
/// Every public operation opens exactly one unit of work (the sweep opens one per order), commits
/// it, and only then publishes the domain events the aggregates queued up.
pub struct OrderService<B> {
    db: B,
    publisher: EventPublisher,
    payment_window: Duration,
}

impl<B> OrderService<B> {
    pub fn new(db: B, publisher: EventPublisher) -> Self {
        Self { db, publisher, payment_window: Duration::minutes(DEFAULT_PAYMENT_WINDOW_MINUTES) }
    }

    /// Overrides the default payment deadline applied to new orders.
    pub fn with_payment_window(mut self, window: Duration) -> Self {
        self.payment_window = window;
        self
    }
}

impl<B> OrderService<B>
where B: ShopDatabase
{
    /// Opens a new pending order, reserving stock on the product in the same transaction.
    ///
    /// A version conflict on the stock write is retried exactly once against a freshly loaded
    /// product; if the retry fails too, the caller sees `InsufficientStock`.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, ShopError> {
        let mut uow = self.db.begin().await?;
        let user = uow
            .fetch_user(&request.user_id)
            .await?
            .ok_or_else(|| ShopError::not_found("user", request.user_id.as_str()))?;
        let product = uow
            .fetch_product(&request.product_id)
            .await?
            .ok_or_else(|| ShopError::not_found("product", request.product_id.as_str()))?;
        if !product.is_available() {
            return Err(ShopError::Validation(format!("Product {} is not available for purchase", product.id)));
        }
        if !product.has_sufficient_stock(request.quantity) {
            return Err(ShopError::InsufficientStock(product.id));
        }
        let referrer_id = self.resolve_referrer(&mut uow, request.referrer.clone()).await?;
        let mut new_order = NewOrder::new(user.id.clone(), product.id.clone(), product.price, request.quantity);
        new_order.payment_method = request.payment_method;
        new_order.notes = request.notes.clone();
        new_order.referrer_id = referrer_id;
        new_order.promocode = request.promocode.clone();
        new_order.is_trial = request.is_trial;
        new_order.is_extend = request.is_extend;
        new_order.payment_window = self.payment_window;
        let mut order = Order::create(new_order)?;
        reserve_stock(&mut uow, product, request.quantity).await?;
        uow.insert_order(&order).await?;
        let events = order.take_events();
        uow.commit().await?;
        for event in events {
            self.publisher.publish(event).await;
        }
        debug!("🔄️📦️ Created order {} for user {} ({}x {})", order.id, order.user_id, order.quantity, order.product_id);
        Ok(order)
    }

    pub async fn order(&self, id: &OrderId) -> Result<Option<Order>, ShopError> {
        let mut uow = self.db.begin().await?;
        let order = uow.fetch_order(id).await?;
        uow.rollback().await?;
        Ok(order)
    }

    /// `pending` → `paid`.
    pub async fn mark_as_paid(&self, id: &OrderId) -> Result<Order, ShopError> {
        let mut uow = self.db.begin().await?;
        let mut order = uow.fetch_order(id).await?.ok_or_else(|| ShopError::not_found("order", id.as_str()))?;
        order.mark_as_paid()?;
        uow.update_order(&order).await?;
        let events = order.take_events();
        uow.commit().await?;
        for event in events {
            self.publisher.publish(event).await;
        }
        info!("🔄️💰️ Order {} marked as paid", order.id);
        Ok(order)
    }

    /// `paid` → `completed`. For non-trial orders the user's subscription is extended by the
    /// product's duration and the spend recorded, in the same transaction as the order update.
    pub async fn mark_as_completed(&self, id: &OrderId, delivery_notes: Option<String>) -> Result<Order, ShopError> {
        let mut uow = self.db.begin().await?;
        let mut order = uow.fetch_order(id).await?.ok_or_else(|| ShopError::not_found("order", id.as_str()))?;
        order.complete(delivery_notes)?;
        if !order.is_trial {
            let mut user = uow
                .fetch_user(&order.user_id)
                .await?
                .ok_or_else(|| ShopError::not_found("user", order.user_id.as_str()))?;
            let product = uow
                .fetch_product(&order.product_id)
                .await?
                .ok_or_else(|| ShopError::not_found("product", order.product_id.as_str()))?;
            if product.duration_days > 0 {
                user.extend_subscription(product.duration_days);
            }
            user.record_purchase(order.total_amount()?)?;
            uow.update_user(&user).await?;
        }
        uow.update_order(&order).await?;
        let events = order.take_events();
        uow.commit().await?;
        for event in events {
            self.publisher.publish(event).await;
        }
        info!("🔄️📦️ Order {} completed", order.id);
        Ok(order)
    }

    /// Cancels an order, releasing its stock reservation when the order was still pending.
    pub async fn cancel_order(&self, id: &OrderId, reason: Option<String>) -> Result<Order, ShopError> {
        self.close_order(id, reason, false).await
    }

    /// Lapsed-deadline variant of [`cancel_order`](Self::cancel_order); only valid while pending.
    pub async fn expire_order(&self, id: &OrderId) -> Result<Order, ShopError> {
        self.close_order(id, None, true).await
    }

    async fn close_order(&self, id: &OrderId, reason: Option<String>, expiry: bool) -> Result<Order, ShopError> {
        let mut uow = self.db.begin().await?;
        let mut order = uow.fetch_order(id).await?.ok_or_else(|| ShopError::not_found("order", id.as_str()))?;
        let releases_stock = order.status == OrderStatus::Pending;
        if releases_stock {
            let product = uow
                .fetch_product(&order.product_id)
                .await?
                .ok_or_else(|| ShopError::not_found("product", order.product_id.as_str()))?;
            release_stock(&mut uow, product, order.quantity).await?;
        }
        if expiry {
            order.expire()?;
        } else {
            order.cancel(reason)?;
        }
        uow.update_order(&order).await?;
        let events = order.take_events();
        uow.commit().await?;
        for event in events {
            self.publisher.publish(event).await;
        }
        info!("🔄️📦️ Order {} cancelled{}", order.id, if expiry { " (expired)" } else { "" });
        Ok(order)
    }

    /// Finds every pending order whose payment deadline has lapsed and cancels it, releasing
    /// stock. Each order runs in its own short transaction; a failing order is logged, rolled
    /// back and skipped, and never aborts the batch or the sweep.
    pub async fn process_expired_orders(&self) -> Result<SweepOutcome, ShopError> {
        let now = Utc::now();
        let mut uow = self.db.begin().await?;
        let expired = uow.fetch_expired_pending_orders(now).await?;
        uow.rollback().await?;
        if expired.is_empty() {
            trace!("🕰️ No expired orders to sweep");
            return Ok(SweepOutcome::default());
        }
        debug!("🕰️ Sweeping {} expired orders", expired.len());
        let mut outcome = SweepOutcome::default();
        for batch in expired.chunks(SWEEP_BATCH_SIZE) {
            trace!("🕰️ Sweeping a batch of {}", batch.len());
            for stale in batch {
                match self.expire_one(&stale.id, now).await {
                    Ok(Some(events)) => {
                        outcome.expired += 1;
                        for event in events {
                            self.publisher.publish(event).await;
                        }
                    },
                    // The order was paid or cancelled between the scan and this batch
                    Ok(None) => outcome.skipped += 1,
                    Err(e) => {
                        warn!("🕰️ Failed to expire order {}: {e}", stale.id);
                        outcome.failures += 1;
                    },
                }
            }
        }
        info!(
            "🕰️ Expiration sweep done. {} expired, {} skipped, {} failures",
            outcome.expired, outcome.skipped, outcome.failures
        );
        Ok(outcome)
    }

    /// Expires one order in its own unit of work. An error rolls that order's writes back
    /// without disturbing the rest of the batch; `None` means the order moved on between the
    /// scan and this transaction.
    async fn expire_one(
        &self,
        id: &OrderId,
        now: chrono::DateTime<Utc>,
    ) -> Result<Option<Vec<crate::events::ShopEvent>>, ShopError> {
        let mut uow = self.db.begin().await?;
        let Some(mut order) = uow.fetch_order(id).await? else {
            uow.rollback().await?;
            return Ok(None);
        };
        if order.status != OrderStatus::Pending || !order.is_expired_at(now) {
            uow.rollback().await?;
            return Ok(None);
        }
        let product = uow
            .fetch_product(&order.product_id)
            .await?
            .ok_or_else(|| ShopError::not_found("product", order.product_id.as_str()))?;
        order.expire()?;
        uow.update_order(&order).await?;
        release_stock(&mut uow, product, order.quantity).await?;
        let events = order.take_events();
        uow.commit().await?;
        Ok(Some(events))
    }

    async fn resolve_referrer(&self, uow: &mut B::Uow, referrer: Option<Referrer>) -> Result<Option<UserId>, ShopError> {
        match referrer {
            None => Ok(None),
            Some(Referrer::Id(id)) => Ok(uow.fetch_user(&id).await?.map(|u| u.id)),
            Some(Referrer::TelegramId(tg_id)) => Ok(uow.fetch_user_by_telegram_id(tg_id).await?.map(|u| u.id)),
        }
    }
}

/// Decrements the product's stock and writes it back. A [`ShopError::VersionConflict`] on the
/// write means somebody else moved the stock under us; the product is reloaded and the decrement
/// retried exactly once before the failure is reported as `InsufficientStock`.
async fn reserve_stock<U: UnitOfWork>(uow: &mut U, mut product: Product, quantity: i64) -> Result<(), ShopError> {
    let id = product.id.clone();
    product.decrease_stock(quantity)?;
    match uow.update_product(&product).await {
        Ok(()) => Ok(()),
        Err(ShopError::VersionConflict { .. }) => {
            debug!("🔄️📦️ Stock write conflict on product {id}, retrying once");
            let mut fresh =
                uow.fetch_product(&id).await?.ok_or_else(|| ShopError::not_found("product", id.as_str()))?;
            match fresh.decrease_stock(quantity) {
                Ok(()) => uow.update_product(&fresh).await.map_err(|_| ShopError::InsufficientStock(id)),
                Err(_) => Err(ShopError::InsufficientStock(id)),
            }
        },
        Err(e) => Err(e),
    }
}

/// Returns stock to the product, with the same single-retry policy as [`reserve_stock`].
async fn release_stock<U: UnitOfWork>(uow: &mut U, mut product: Product, quantity: i64) -> Result<(), ShopError> {
    let id = product.id.clone();
    product.increase_stock(quantity);
    match uow.update_product(&product).await {
        Ok(()) => Ok(()),
        Err(ShopError::VersionConflict { .. }) => {
            debug!("🔄️📦️ Stock write conflict on product {id}, retrying once");
            let mut fresh =
                uow.fetch_product(&id).await?.ok_or_else(|| ShopError::not_found("product", id.as_str()))?;
            fresh.increase_stock(quantity);
            uow.update_product(&fresh).await
        },
        Err(e) => Err(e),
    }
}
