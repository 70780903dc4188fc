use std::fmt::Display;

use kiosk_engine::{
    db_types::{PaymentMethod, ProductId, UserId},
    services::{CreateOrderRequest, Referrer},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub user_id: String,
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Telegram id of the referring user, resolved to an internal user id if known.
    #[serde(default)]
    pub referrer_telegram_id: Option<i64>,
    #[serde(default)]
    pub promocode: Option<String>,
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default)]
    pub is_extend: bool,
}

impl From<NewOrderRequest> for CreateOrderRequest {
    fn from(req: NewOrderRequest) -> Self {
        CreateOrderRequest {
            user_id: UserId::from(req.user_id),
            product_id: ProductId::from(req.product_id),
            quantity: req.quantity,
            payment_method: req.payment_method,
            notes: req.notes,
            referrer: req.referrer_telegram_id.map(Referrer::TelegramId),
            promocode: req.promocode,
            is_trial: req.is_trial,
            is_extend: req.is_extend,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPaymentRequest {
    /// Overrides the method stored on the order, if any.
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}
