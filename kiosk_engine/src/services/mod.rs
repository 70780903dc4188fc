//! Service layer orchestrating orders and payments over a [`ShopDatabase`](crate::traits::ShopDatabase).
//!
//! Services own the unit-of-work boundaries: one unit of work per logical operation, events
//! published only after the commit succeeds.
mod order_service;
mod payment_service;

pub use order_service::{CreateOrderRequest, OrderService, Referrer, SweepOutcome};
pub use payment_service::{PaymentService, ReconcileOutcome};
