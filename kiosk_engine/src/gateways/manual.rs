//! Admin-driven payments with no upstream provider. Used for comped orders and bank-transfer
//! style flows confirmed by an operator; webhooks for it originate from the admin surface, which
//! authenticates upstream of the engine.
use async_trait::async_trait;
use kiosk_common::{Currency, Money};
use log::*;
use serde_json::Value;

use crate::{
    db_types::PaymentMethod,
    gateways::{ManualConfig, PaymentData, PaymentGateway, PaymentResult, PaymentStatus, WebhookData},
};

const SUPPORTED_CURRENCIES: [Currency; 4] = [Currency::USD, Currency::EUR, Currency::RUB, Currency::XTR];

pub struct ManualGateway {
    config: ManualConfig,
}

impl ManualGateway {
    pub fn new(config: ManualConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PaymentGateway for ManualGateway {
    fn name(&self) -> &'static str {
        "Manual"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::Manual
    }

    fn is_available(&self) -> bool {
        self.config.enabled
    }

    fn supported_currencies(&self) -> &[Currency] {
        &SUPPORTED_CURRENCIES
    }

    async fn create_payment(&self, data: &PaymentData) -> PaymentResult {
        if !self.is_available() {
            return PaymentResult::failure("Manual gateway is not available");
        }
        info!("🛠️ Opened manual payment for order {}, awaiting operator confirmation", data.order_id);
        PaymentResult::ok(data.order_id.as_str())
    }

    async fn get_payment_status(&self, _payment_id: &str) -> PaymentStatus {
        PaymentStatus::Pending
    }

    async fn handle_webhook(&self, payload: &Value) -> Option<WebhookData> {
        let order_id = payload["order_id"].as_str()?;
        let status = payload["status"].as_str().unwrap_or_default().parse().ok()?;
        let mut data = WebhookData::new(order_id, status);
        data.raw_amount = payload["amount"].as_str().map(String::from);
        data.raw_currency = payload["currency"].as_str().map(String::from);
        Some(data)
    }

    async fn refund_payment(&self, payment_id: &str, _amount: Option<Money>) -> bool {
        info!("🛠️ Manual refund recorded for payment {payment_id}");
        true
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn operator_confirmations_parse_the_status_vocabulary() {
        let gw = ManualGateway::new(ManualConfig { enabled: true });
        let data = gw
            .handle_webhook(&json!({ "order_id": "ord_1", "status": "completed", "amount": "10.00", "currency": "USD" }))
            .await
            .unwrap();
        assert_eq!(data.status, PaymentStatus::Completed);
        assert!(gw.handle_webhook(&json!({ "order_id": "ord_1", "status": "sideways" })).await.is_none());
    }

    #[tokio::test]
    async fn disabled_manual_gateway_rejects_payments() {
        let gw = ManualGateway::new(ManualConfig { enabled: false });
        assert!(!gw.is_available());
        let data = PaymentData {
            order_id: "ord_1".into(),
            user_id: "usr_1".into(),
            product_id: "prd_1".into(),
            amount: Money::from_cents(100, Currency::USD).unwrap(),
            description: "Test".into(),
            user_telegram_id: None,
            webhook_url: None,
            return_url: None,
        };
        assert!(!gw.create_payment(&data).await.success);
    }
}
