use chrono::{DateTime, Duration, Utc};
use kiosk_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OrderId, OrderStatus, PaymentMethod, ProductId, UserId},
    events::{
        OrderCancelledEvent, OrderCompletedEvent, OrderCreatedEvent, OrderFailedEvent, OrderRefundedEvent,
        PaymentReceivedEvent, ShopEvent,
    },
    traits::ShopError,
};

pub const DEFAULT_PAYMENT_WINDOW_MINUTES: i64 = 30;

/// Everything needed to open an order. Produced by the service layer after it has validated the
/// user and the product.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Unit price at the time of ordering.
    pub amount: Money,
    pub quantity: i64,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub referrer_id: Option<UserId>,
    pub promocode: Option<String>,
    pub is_trial: bool,
    pub is_extend: bool,
    /// How long the buyer has to pay before the order lapses.
    pub payment_window: Duration,
}

impl NewOrder {
    pub fn new(user_id: UserId, product_id: ProductId, amount: Money, quantity: i64) -> Self {
        Self {
            user_id,
            product_id,
            amount,
            quantity,
            payment_method: None,
            notes: None,
            referrer_id: None,
            promocode: None,
            is_trial: false,
            is_extend: false,
            payment_window: Duration::minutes(DEFAULT_PAYMENT_WINDOW_MINUTES),
        }
    }
}

/// An order and its payment lifecycle.
///
/// `amount` is the *unit* price; the amount actually charged is [`Order::total_amount`]. State
/// only moves through the named transition methods, each of which appends exactly one domain event
/// to the pending list. Callers publish and clear that list with [`Order::take_events`] after the
/// order has been persisted. Terminal orders are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub amount: Money,
    pub quantity: i64,
    pub status: OrderStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub payment_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub referrer_id: Option<UserId>,
    pub promocode: Option<String>,
    pub is_trial: bool,
    pub is_extend: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<ShopEvent>,
}

impl Order {
    /// Opens a new `pending` order with the default 30 minute payment window and queues the
    /// order-created event.
    pub fn create(new_order: NewOrder) -> Result<Self, ShopError> {
        if new_order.quantity <= 0 {
            return Err(ShopError::Validation(format!("Order quantity must be positive, got {}", new_order.quantity)));
        }
        let total = new_order.amount.checked_mul(new_order.quantity)?;
        let now = Utc::now();
        let mut order = Self {
            id: OrderId::random(),
            user_id: new_order.user_id,
            product_id: new_order.product_id,
            amount: new_order.amount,
            quantity: new_order.quantity,
            status: OrderStatus::Pending,
            payment_method: new_order.payment_method,
            payment_id: None,
            external_payment_id: None,
            payment_url: None,
            expires_at: Some(now + new_order.payment_window),
            paid_at: None,
            completed_at: None,
            cancelled_at: None,
            notes: new_order.notes,
            referrer_id: new_order.referrer_id,
            promocode: new_order.promocode,
            is_trial: new_order.is_trial,
            is_extend: new_order.is_extend,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        };
        order.events.push(ShopEvent::OrderCreated(OrderCreatedEvent {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            product_id: order.product_id.clone(),
            total,
            quantity: order.quantity,
            is_trial: order.is_trial,
        }));
        Ok(order)
    }

    /// Rebuilds an order from storage with an empty pending-event list.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: OrderId,
        user_id: UserId,
        product_id: ProductId,
        amount: Money,
        quantity: i64,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            product_id,
            amount,
            quantity,
            status,
            payment_method: None,
            payment_id: None,
            external_payment_id: None,
            payment_url: None,
            expires_at: None,
            paid_at: None,
            completed_at: None,
            cancelled_at: None,
            notes: None,
            referrer_id: None,
            promocode: None,
            is_trial: false,
            is_extend: false,
            created_at,
            updated_at,
            events: Vec::new(),
        }
    }

    /// The amount actually charged: unit price times quantity.
    pub fn total_amount(&self) -> Result<Money, ShopError> {
        Ok(self.amount.checked_mul(self.quantity)?)
    }

    //--------------------------------------    Transitions    -------------------------------------------------------

    /// Records the gateway's payment metadata. Only valid while the order is still `pending`.
    pub fn set_payment_details(
        &mut self,
        method: PaymentMethod,
        payment_id: String,
        external_payment_id: Option<String>,
        payment_url: Option<String>,
    ) -> Result<(), ShopError> {
        if self.status != OrderStatus::Pending {
            return Err(ShopError::invalid_transition("set payment details", self.status));
        }
        self.payment_method = Some(method);
        self.payment_id = Some(payment_id);
        self.external_payment_id = external_payment_id;
        self.payment_url = payment_url;
        self.touch();
        Ok(())
    }

    /// `pending` → `paid`. Emits a payment-received event carrying the total charged.
    pub fn mark_as_paid(&mut self) -> Result<(), ShopError> {
        if self.status != OrderStatus::Pending {
            return Err(ShopError::invalid_transition("mark as paid", self.status));
        }
        let total = self.total_amount()?;
        let now = Utc::now();
        self.status = OrderStatus::Paid;
        self.paid_at = Some(now);
        self.touch();
        self.events.push(ShopEvent::PaymentReceived(PaymentReceivedEvent {
            order_id: self.id.clone(),
            user_id: self.user_id.clone(),
            payment_id: self.payment_id.clone(),
            amount: total,
            received_at: now,
        }));
        Ok(())
    }

    /// `paid` → `completed`. The delivery notes, if any, are appended to the order notes.
    pub fn complete(&mut self, delivery_notes: Option<String>) -> Result<(), ShopError> {
        if self.status != OrderStatus::Paid {
            return Err(ShopError::invalid_transition("complete", self.status));
        }
        self.status = OrderStatus::Completed;
        self.completed_at = Some(Utc::now());
        if let Some(notes) = &delivery_notes {
            self.append_note(notes);
        }
        self.touch();
        self.events.push(ShopEvent::OrderCompleted(OrderCompletedEvent {
            order_id: self.id.clone(),
            user_id: self.user_id.clone(),
            product_id: self.product_id.clone(),
            delivery_notes,
        }));
        Ok(())
    }

    /// Cancels the order. Invalid once the order is `completed` or `refunded`.
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), ShopError> {
        if matches!(self.status, OrderStatus::Completed | OrderStatus::Refunded) {
            return Err(ShopError::invalid_transition("cancel", self.status));
        }
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
        if let Some(reason) = &reason {
            self.append_note(reason);
        }
        self.touch();
        self.events.push(ShopEvent::OrderCancelled(OrderCancelledEvent {
            order_id: self.id.clone(),
            user_id: self.user_id.clone(),
            reason,
        }));
        Ok(())
    }

    /// `paid`/`completed` → `refunded`.
    pub fn refund(&mut self, reason: Option<String>) -> Result<(), ShopError> {
        if !matches!(self.status, OrderStatus::Paid | OrderStatus::Completed) {
            return Err(ShopError::invalid_transition("refund", self.status));
        }
        let total = self.total_amount()?;
        self.status = OrderStatus::Refunded;
        if let Some(reason) = &reason {
            self.append_note(reason);
        }
        self.touch();
        self.events.push(ShopEvent::OrderRefunded(OrderRefundedEvent {
            order_id: self.id.clone(),
            user_id: self.user_id.clone(),
            amount: total,
            reason,
        }));
        Ok(())
    }

    /// Administrative transition to `failed`, valid from any state.
    pub fn fail(&mut self, reason: Option<String>) {
        self.status = OrderStatus::Failed;
        if let Some(reason) = &reason {
            self.append_note(reason);
        }
        self.touch();
        self.events.push(ShopEvent::OrderFailed(OrderFailedEvent {
            order_id: self.id.clone(),
            user_id: self.user_id.clone(),
            reason,
        }));
    }

    /// Lapsed payment window. Semantically a cancellation with an "expired" note; there is no
    /// separate terminal status for it.
    pub fn expire(&mut self) -> Result<(), ShopError> {
        if self.status != OrderStatus::Pending {
            return Err(ShopError::invalid_transition("expire", self.status));
        }
        self.cancel(Some("expired".to_string()))
    }

    //--------------------------------------    Predicates    --------------------------------------------------------

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|deadline| now > deadline).unwrap_or(false)
    }

    pub fn can_be_paid(&self) -> bool {
        self.status == OrderStatus::Pending && !self.is_expired()
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Paid)
    }

    pub fn can_be_refunded(&self) -> bool {
        matches!(self.status, OrderStatus::Paid | OrderStatus::Completed)
    }

    /// Drains the pending domain events. Call after the order has been persisted, handing the
    /// result to the event publisher.
    pub fn take_events(&mut self) -> Vec<ShopEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn append_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(note);
            },
            None => self.notes = Some(note.to_string()),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod test {
    use kiosk_common::Currency;

    use super::*;

    fn pending_order() -> Order {
        let amount = Money::from_cents(2999, Currency::USD).unwrap();
        let new_order = NewOrder::new(UserId::random(), ProductId::random(), amount, 2);
        Order::create(new_order).unwrap()
    }

    #[test]
    fn creation_queues_the_created_event_with_the_total() {
        let mut order = pending_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.expires_at.is_some());
        let events = order.take_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ShopEvent::OrderCreated(e) => {
                assert_eq!(e.total, Money::from_cents(5998, Currency::USD).unwrap());
                assert_eq!(e.quantity, 2);
            },
            other => panic!("Unexpected event {other:?}"),
        }
        assert!(!order.has_pending_events());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let amount = Money::from_cents(100, Currency::USD).unwrap();
        let new_order = NewOrder::new(UserId::random(), ProductId::random(), amount, 0);
        assert!(Order::create(new_order).is_err());
    }

    #[test]
    fn the_total_is_the_unit_price_times_quantity() {
        let order = pending_order();
        assert_eq!(order.total_amount().unwrap(), Money::from_cents(5998, Currency::USD).unwrap());
    }

    #[test]
    fn overflowing_totals_surface_as_money_errors() {
        let amount = Money::from_cents(i64::MAX, Currency::USD).unwrap();
        let new_order = NewOrder::new(UserId::random(), ProductId::random(), amount, 2);
        assert!(matches!(Order::create(new_order), Err(ShopError::Money(_))));
    }

    #[test]
    fn happy_path_runs_pending_paid_completed() {
        let mut order = pending_order();
        order.take_events();
        order.mark_as_paid().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.paid_at.is_some());
        order.complete(Some("key: ABCD-1234".into())).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.notes.as_deref().unwrap().contains("ABCD-1234"));
        let events = order.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ShopEvent::PaymentReceived(_)));
        assert!(matches!(events[1], ShopEvent::OrderCompleted(_)));
    }

    #[test]
    fn each_transition_appends_exactly_one_event() {
        let mut order = pending_order();
        order.take_events();
        order.mark_as_paid().unwrap();
        assert_eq!(order.take_events().len(), 1);
        order.refund(Some("buyer remorse".into())).unwrap();
        assert_eq!(order.take_events().len(), 1);
    }

    #[test]
    fn paying_twice_is_an_invalid_transition() {
        let mut order = pending_order();
        order.mark_as_paid().unwrap();
        let err = order.mark_as_paid().unwrap_err();
        assert!(matches!(err, ShopError::InvalidTransition { .. }));
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn completed_orders_cannot_be_cancelled() {
        let mut order = pending_order();
        order.mark_as_paid().unwrap();
        order.complete(None).unwrap();
        assert!(order.cancel(None).is_err());
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn paid_orders_can_still_be_cancelled() {
        let mut order = pending_order();
        order.mark_as_paid().unwrap();
        order.cancel(Some("ops request".into())).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancelled_at.is_some());
    }

    #[test]
    fn refund_requires_paid_or_completed() {
        let mut order = pending_order();
        assert!(order.refund(None).is_err());
        order.mark_as_paid().unwrap();
        order.refund(None).unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
    }

    #[test]
    fn expire_is_a_cancellation_with_a_note() {
        let mut order = pending_order();
        order.take_events();
        order.expire().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.notes.as_deref(), Some("expired"));
        let events = order.take_events();
        assert!(matches!(events[0], ShopEvent::OrderCancelled(_)));
    }

    #[test]
    fn expire_fails_once_completed_and_leaves_the_order_alone() {
        let mut order = pending_order();
        order.mark_as_paid().unwrap();
        order.complete(None).unwrap();
        assert!(order.expire().is_err());
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn payment_details_are_only_set_while_pending() {
        let mut order = pending_order();
        order
            .set_payment_details(PaymentMethod::Cryptomus, "pay_123".into(), Some("inv_9".into()), None)
            .unwrap();
        assert_eq!(order.payment_id.as_deref(), Some("pay_123"));
        order.mark_as_paid().unwrap();
        assert!(order.set_payment_details(PaymentMethod::Manual, "pay_456".into(), None, None).is_err());
    }

    #[test]
    fn expiry_predicate_uses_the_deadline() {
        let mut order = pending_order();
        assert!(order.can_be_paid());
        order.expires_at = Some(Utc::now() - Duration::minutes(1));
        assert!(order.is_expired());
        assert!(!order.can_be_paid());
    }

    #[test]
    fn fail_works_from_any_state() {
        let mut order = pending_order();
        order.mark_as_paid().unwrap();
        order.complete(None).unwrap();
        order.take_events();
        order.fail(Some("chargeback".into()));
        assert_eq!(order.status, OrderStatus::Failed);
        assert!(matches!(order.take_events()[0], ShopEvent::OrderFailed(_)));
    }
}
