use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Mutex,
};

use async_trait::async_trait;
use kiosk_common::{Currency, Money};
use serde_json::Value;

use crate::{
    db_types::PaymentMethod,
    gateways::{PaymentData, PaymentGateway, PaymentResult, PaymentStatus, WebhookData},
};

/// A scriptable [`PaymentGateway`].
///
/// Webhook payloads for it look like `{"payment_id": "...", "status": "completed", "amount":
/// "29.99", "currency": "USD", "sign": "valid"}`; any payload whose `sign` differs from `"valid"`
/// is rejected, mimicking a signature check.
pub struct MockGateway {
    method: PaymentMethod,
    available: AtomicBool,
    create_result: Mutex<PaymentResult>,
    reported_status: Mutex<PaymentStatus>,
    refund_accepted: AtomicBool,
    pub create_calls: AtomicU32,
    pub refund_calls: AtomicU32,
    pub status_calls: AtomicU32,
}

impl MockGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            available: AtomicBool::new(true),
            create_result: Mutex::new(PaymentResult::default()),
            reported_status: Mutex::new(PaymentStatus::Pending),
            refund_accepted: AtomicBool::new(true),
            create_calls: AtomicU32::new(0),
            refund_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The next `create_payment` succeeds, echoing the order id back as payment id.
    pub fn succeed_with_url(&self, url: &str) {
        let mut result = self.create_result.lock().unwrap();
        *result = PaymentResult { success: true, payment_url: Some(url.to_string()), ..Default::default() };
    }

    pub fn fail_with(&self, message: &str) {
        let mut result = self.create_result.lock().unwrap();
        *result = PaymentResult::failure(message);
    }

    pub fn report_status(&self, status: PaymentStatus) {
        *self.reported_status.lock().unwrap() = status;
    }

    pub fn set_refund_accepted(&self, accepted: bool) {
        self.refund_accepted.store(accepted, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn method(&self) -> PaymentMethod {
        self.method
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn supported_currencies(&self) -> &[Currency] {
        const ALL: [Currency; 4] = [Currency::USD, Currency::EUR, Currency::RUB, Currency::XTR];
        &ALL
    }

    async fn create_payment(&self, data: &PaymentData) -> PaymentResult {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut result = self.create_result.lock().unwrap().clone();
        if result.success && result.payment_id.is_none() {
            result.payment_id = Some(data.order_id.to_string());
        }
        result
    }

    async fn get_payment_status(&self, _payment_id: &str) -> PaymentStatus {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        *self.reported_status.lock().unwrap()
    }

    async fn handle_webhook(&self, payload: &Value) -> Option<WebhookData> {
        if payload["sign"].as_str() != Some("valid") {
            return None;
        }
        let payment_id = payload["payment_id"].as_str()?;
        let status = payload["status"].as_str()?.parse().ok()?;
        let mut data = WebhookData::new(payment_id, status);
        data.external_payment_id = payload["external_id"].as_str().map(String::from);
        data.raw_amount = payload["amount"].as_str().map(String::from);
        data.raw_currency = payload["currency"].as_str().map(String::from);
        data.error_message = payload["message"].as_str().map(String::from);
        Some(data)
    }

    async fn refund_payment(&self, _payment_id: &str, _amount: Option<Money>) -> bool {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        self.refund_accepted.load(Ordering::SeqCst)
    }

    fn validate_webhook_signature(&self, _payload: &Value, signature: &str) -> bool {
        signature == "valid"
    }
}
