use kiosk_common::MoneyError;
use thiserror::Error;

use crate::db_types::{OrderStatus, PaymentMethod, ProductId};

/// The engine-wide error taxonomy.
///
/// Business errors (`NotFound`, `InvalidTransition`, `InsufficientStock`, `GatewayUnavailable`)
/// are surfaced to the caller and are not retried. `VersionConflict` is the typed lost-update
/// signal from a backend's `update_product`; order creation retries it exactly once before
/// reclassifying it as `InsufficientStock`. `Database` failures are fatal to the operation and
/// propagate unchanged.
#[derive(Debug, Clone, Error)]
pub enum ShopError {
    #[error("{kind} {id} was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Cannot {action} an order in status '{status}'")]
    InvalidTransition { action: &'static str, status: OrderStatus },
    #[error("Insufficient stock for product {0}")]
    InsufficientStock(ProductId),
    #[error("Concurrent write detected for {kind} {id}")]
    VersionConflict { kind: &'static str, id: String },
    #[error("No payment gateway is available for method '{0}'")]
    GatewayUnavailable(PaymentMethod),
    #[error("Webhook rejected: {0}")]
    WebhookRejected(String),
    #[error("Gateway refused the operation: {0}")]
    Gateway(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("{0}")]
    Money(#[from] MoneyError),
    #[error("Database error: {0}")]
    Database(String),
}

impl ShopError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }

    pub fn invalid_transition(action: &'static str, status: OrderStatus) -> Self {
        Self::InvalidTransition { action, status }
    }
}

impl From<sqlx::Error> for ShopError {
    fn from(e: sqlx::Error) -> Self {
        ShopError::Database(e.to_string())
    }
}
