use chrono::{DateTime, Utc};
use kiosk_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, ProductId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub total: Money,
    pub quantity: i64,
    pub is_trial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceivedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_id: Option<String>,
    pub amount: Money,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub delivery_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFailedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub reason: Option<String>,
}

/// Domain events emitted by the [`Order`](crate::entities::Order) aggregate. Consumed by the
/// out-of-scope notification and referral systems through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShopEvent {
    OrderCreated(OrderCreatedEvent),
    PaymentReceived(PaymentReceivedEvent),
    OrderCompleted(OrderCompletedEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderRefunded(OrderRefundedEvent),
    OrderFailed(OrderFailedEvent),
}

impl ShopEvent {
    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::OrderCreated(e) => &e.order_id,
            Self::PaymentReceived(e) => &e.order_id,
            Self::OrderCompleted(e) => &e.order_id,
            Self::OrderCancelled(e) => &e.order_id,
            Self::OrderRefunded(e) => &e.order_id,
            Self::OrderFailed(e) => &e.order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated(_) => "order_created",
            Self::PaymentReceived(_) => "payment_received",
            Self::OrderCompleted(_) => "order_completed",
            Self::OrderCancelled(_) => "order_cancelled",
            Self::OrderRefunded(_) => "order_refunded",
            Self::OrderFailed(_) => "order_failed",
        }
    }
}
