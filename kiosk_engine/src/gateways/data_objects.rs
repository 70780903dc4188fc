use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use kiosk_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{ConversionError, OrderId, ProductId, UserId};

/// Normalized payment state as reported by a gateway. This is the gateway's view of the payment,
/// not the order lifecycle; the payment service maps it onto order transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(ConversionError { kind: "payment status", value: other.to_string() }),
        }
    }
}

/// Everything a gateway needs to open a payment for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Total charged, not the unit price.
    pub amount: Money,
    pub description: String,
    pub user_telegram_id: Option<i64>,
    pub webhook_url: Option<String>,
    pub return_url: Option<String>,
}

/// The outcome of a payment-creation attempt. Business failures set `success=false` and
/// `error_message`; gateways reserve `Err` returns for nothing, this struct is the whole story.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    /// Our reference for the payment, echoed back by webhooks.
    pub payment_id: Option<String>,
    /// The provider's own id for the payment, when it issues one.
    pub external_payment_id: Option<String>,
    pub payment_url: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
}

impl PaymentResult {
    pub fn ok(payment_id: impl Into<String>) -> Self {
        Self { success: true, payment_id: Some(payment_id.into()), ..Default::default() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, error_message: Some(message.into()), ..Default::default() }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.payment_url = Some(url.into());
        self
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_payment_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A normalized webhook notification. `payment_id` is the reference we handed the gateway when
/// the payment was created; `raw_amount`/`raw_currency` are kept verbatim so the payment service
/// can cross-check them against the order before trusting the notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    pub payment_id: String,
    pub external_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub raw_amount: Option<String>,
    pub raw_currency: Option<String>,
    pub error_message: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl WebhookData {
    pub fn new(payment_id: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            payment_id: payment_id.into(),
            external_payment_id: None,
            status,
            raw_amount: None,
            raw_currency: None,
            error_message: None,
            received_at: Utc::now(),
        }
    }
}
