//! End-to-end order lifecycle tests against the in-memory backend and a scriptable gateway.
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use kiosk_common::{Currency, Money};
use kiosk_engine::{
    db_types::{OrderStatus, PaymentMethod},
    entities::{Product, User, UNLIMITED_STOCK},
    events::{EventBus, EventHandlerFn, ShopEvent},
    gateways::PaymentGatewayFactory,
    services::CreateOrderRequest,
    test_utils::{MemoryDatabase, MockGateway},
    traits::ShopError,
    OrderService,
    PaymentService,
};
use serde_json::json;

fn usd(cents: i64) -> Money {
    Money::from_cents(cents, Currency::USD).unwrap()
}

struct Harness {
    db: MemoryDatabase,
    gateway: Arc<MockGateway>,
    user: User,
    product: Product,
    bus: EventBus,
    seen_events: Arc<Mutex<Vec<ShopEvent>>>,
}

fn harness(price_cents: i64, duration_days: i64, stock: i64) -> Harness {
    let _ = env_logger::try_init();
    let db = MemoryDatabase::new();
    let user = User::new(Some(777), Some("alice".to_string()));
    let product = Product::new("Starter plan", "30 days of access", usd(price_cents), duration_days, stock).unwrap();
    db.add_user(user.clone());
    db.add_product(product.clone());
    let gateway = Arc::new(MockGateway::new(PaymentMethod::Cryptomus));
    gateway.succeed_with_url("https://pay.example.com/abc");
    let seen_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen_events);
    let handler: EventHandlerFn = Arc::new(move |ev| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().unwrap().push(ev);
        })
    });
    let bus = EventBus::new(64, handler);
    Harness { db, gateway, user, product, bus, seen_events }
}

impl Harness {
    fn orders(&self) -> OrderService<MemoryDatabase> {
        OrderService::new(self.db.clone(), self.bus.publisher())
    }

    fn payments(&self) -> PaymentService<MemoryDatabase> {
        let factory = PaymentGatewayFactory::from_gateways(vec![self.gateway.clone()]);
        PaymentService::new(self.db.clone(), factory, self.bus.publisher())
    }

    fn new_order_request(&self, quantity: i64) -> CreateOrderRequest {
        CreateOrderRequest::new(self.user.id.clone(), self.product.id.clone(), quantity)
    }

    /// Winds the bus down and returns every event the handler saw, in order.
    async fn collected_events(self) -> Vec<ShopEvent> {
        self.bus.run().await;
        let events = self.seen_events.lock().unwrap();
        events.clone()
    }
}

#[tokio::test]
async fn a_purchase_runs_from_order_to_active_subscription() {
    let h = harness(2999, 30, UNLIMITED_STOCK);
    let orders = h.orders();
    let payments = h.payments();

    let before = Utc::now();
    let order = orders.create_order(h.new_order_request(1)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount().unwrap(), usd(2999));
    let expires_at = order.expires_at.unwrap();
    assert!(expires_at >= before + Duration::minutes(30));
    assert!(expires_at <= Utc::now() + Duration::minutes(30));

    let result = payments.create_payment(&order.id, Some(PaymentMethod::Cryptomus), None, None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.payment_url.as_deref(), Some("https://pay.example.com/abc"));
    let payment_id = result.payment_id.unwrap();

    let webhook = json!({
        "payment_id": payment_id,
        "status": "completed",
        "amount": "29.99",
        "currency": "USD",
        "external_id": "prov-1",
        "sign": "valid",
    });
    let paid = payments.process_webhook(PaymentMethod::Cryptomus, &webhook).await.unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.paid_at.is_some());
    assert_eq!(paid.external_payment_id.as_deref(), Some("prov-1"));

    let done = orders.mark_as_completed(&order.id, Some("key-ABCD".to_string())).await.unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert!(done.notes.as_deref().unwrap().contains("key-ABCD"));

    let user = h.db.user(&h.user.id).unwrap();
    let sub = user.subscription_until.unwrap();
    assert!(sub >= before + Duration::days(30));
    assert_eq!(user.total_spent, Some(usd(2999)));

    drop((orders, payments));
    let names: Vec<&str> = h.collected_events().await.iter().map(|ev| ev.name()).collect();
    assert_eq!(names, vec!["order_created", "payment_received", "order_completed"]);
}

#[tokio::test]
async fn duplicate_payment_webhooks_are_idempotent() {
    let h = harness(2999, 30, UNLIMITED_STOCK);
    let orders = h.orders();
    let payments = h.payments();
    let order = orders.create_order(h.new_order_request(1)).await.unwrap();
    payments.create_payment(&order.id, Some(PaymentMethod::Cryptomus), None, None).await.unwrap();

    let webhook = json!({
        "payment_id": order.id.as_str(),
        "status": "completed",
        "amount": "29.99",
        "currency": "USD",
        "sign": "valid",
    });
    let first = payments.process_webhook(PaymentMethod::Cryptomus, &webhook).await.unwrap();
    let second = payments.process_webhook(PaymentMethod::Cryptomus, &webhook).await.unwrap();
    assert_eq!(second.status, OrderStatus::Paid);
    assert_eq!(second.paid_at, first.paid_at);

    drop((orders, payments));
    let paid_events =
        h.collected_events().await.iter().filter(|ev| ev.name() == "payment_received").count();
    assert_eq!(paid_events, 1);
}

#[tokio::test]
async fn webhooks_with_a_mismatched_amount_are_rejected() {
    let h = harness(2999, 30, UNLIMITED_STOCK);
    let orders = h.orders();
    let payments = h.payments();
    let order = orders.create_order(h.new_order_request(1)).await.unwrap();
    payments.create_payment(&order.id, Some(PaymentMethod::Cryptomus), None, None).await.unwrap();

    let webhook = json!({
        "payment_id": order.id.as_str(),
        "status": "completed",
        "amount": "1.00",
        "currency": "USD",
        "sign": "valid",
    });
    let err = payments.process_webhook(PaymentMethod::Cryptomus, &webhook).await.unwrap_err();
    assert!(matches!(err, ShopError::WebhookRejected(_)));
    assert_eq!(h.db.order(&order.id).unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn stock_reservation_survives_one_concurrent_write() {
    let h = harness(2999, 30, 5);
    let orders = h.orders();

    h.db.induce_product_conflicts(1);
    let order = orders.create_order(h.new_order_request(2)).await.unwrap();
    assert_eq!(order.quantity, 2);
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 3);

    h.db.induce_product_conflicts(2);
    let err = orders.create_order(h.new_order_request(1)).await.unwrap_err();
    assert!(matches!(err, ShopError::InsufficientStock(_)));
    // The failed attempt must not leak stock
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 3);
}

#[tokio::test]
async fn cancelling_an_order_returns_its_stock() {
    let h = harness(2999, 30, 5);
    let orders = h.orders();
    let order = orders.create_order(h.new_order_request(2)).await.unwrap();
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 3);

    let cancelled = orders.cancel_order(&order.id, Some("changed my mind".to_string())).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 5);
}

#[tokio::test]
async fn the_sweep_expires_overdue_orders_and_releases_stock() {
    let h = harness(2999, 30, 5);
    let orders = h.orders();
    let overdue = orders.create_order(h.new_order_request(1)).await.unwrap();
    let fresh = orders.create_order(h.new_order_request(1)).await.unwrap();
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 3);

    // Rewind the first order's deadline past due
    let mut order = h.db.order(&overdue.id).unwrap();
    order.expires_at = Some(Utc::now() - Duration::hours(1));
    h.db.add_order(order);

    let outcome = orders.process_expired_orders().await.unwrap();
    assert_eq!(outcome.expired, 1);
    assert_eq!(outcome.failures, 0);

    let expired = h.db.order(&overdue.id).unwrap();
    assert_eq!(expired.status, OrderStatus::Cancelled);
    assert!(expired.notes.as_deref().unwrap().contains("expired"));
    assert_eq!(h.db.order(&fresh.id).unwrap().status, OrderStatus::Pending);
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 4);
}

#[tokio::test]
async fn one_poisoned_order_does_not_abort_the_sweep() {
    let h = harness(2999, 30, 5);
    let orders = h.orders();
    let poisoned = orders.create_order(h.new_order_request(1)).await.unwrap();
    let healthy = orders.create_order(h.new_order_request(1)).await.unwrap();
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 3);

    let overdue = Utc::now() - Duration::hours(1);
    let mut order = h.db.order(&poisoned.id).unwrap();
    order.expires_at = Some(overdue);
    // Point the order at a product that no longer exists
    order.product_id = kiosk_engine::db_types::ProductId::random();
    h.db.add_order(order);
    let mut order = h.db.order(&healthy.id).unwrap();
    order.expires_at = Some(overdue);
    h.db.add_order(order);

    let outcome = orders.process_expired_orders().await.unwrap();
    assert_eq!(outcome.expired, 1);
    assert_eq!(outcome.failures, 1);

    assert_eq!(h.db.order(&healthy.id).unwrap().status, OrderStatus::Cancelled);
    assert_eq!(h.db.order(&poisoned.id).unwrap().status, OrderStatus::Pending);
    // Only the healthy order's stock came back
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 4);
}

#[tokio::test]
async fn a_failed_expiry_rolls_back_the_whole_order() {
    let h = harness(2999, 30, 5);
    let orders = h.orders();
    let order = orders.create_order(h.new_order_request(2)).await.unwrap();
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 3);

    let mut stale = h.db.order(&order.id).unwrap();
    stale.expires_at = Some(Utc::now() - Duration::hours(1));
    h.db.add_order(stale);

    // Both the stock write and its retry conflict, so the expiry fails after the order
    // transition was already staged
    h.db.induce_product_conflicts(2);
    let outcome = orders.process_expired_orders().await.unwrap();
    assert_eq!(outcome.expired, 0);
    assert_eq!(outcome.failures, 1);
    // Neither the cancellation nor the stock release may stick
    assert_eq!(h.db.order(&order.id).unwrap().status, OrderStatus::Pending);
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 3);

    // The next sweep finishes the job
    let outcome = orders.process_expired_orders().await.unwrap();
    assert_eq!(outcome.expired, 1);
    assert_eq!(h.db.order(&order.id).unwrap().status, OrderStatus::Cancelled);
    assert_eq!(h.db.product(&h.product.id).unwrap().stock, 5);
}

#[tokio::test]
async fn paid_orders_can_be_refunded_through_the_gateway() {
    let h = harness(2999, 30, UNLIMITED_STOCK);
    let orders = h.orders();
    let payments = h.payments();
    let order = orders.create_order(h.new_order_request(1)).await.unwrap();
    payments.create_payment(&order.id, Some(PaymentMethod::Cryptomus), None, None).await.unwrap();
    let webhook = json!({
        "payment_id": order.id.as_str(),
        "status": "completed",
        "amount": "29.99",
        "currency": "USD",
        "sign": "valid",
    });
    payments.process_webhook(PaymentMethod::Cryptomus, &webhook).await.unwrap();

    let refunded = payments.refund_payment(&order.id, Some("buyer remorse".to_string())).await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(h.gateway.refund_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}
