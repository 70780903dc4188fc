//! Cryptomus crypto-payment gateway.
//!
//! Requests are signed with `md5(body + api_key)` in a `sign` header; webhooks carry their own
//! `sign` field computed over the url-encoded, key-sorted payload. Signature checks happen before
//! anything else is read from a webhook.
use async_trait::async_trait;
use kiosk_common::Currency;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde_json::{json, Value};

use crate::{
    db_types::PaymentMethod,
    gateways::{CryptomusConfig, PaymentData, PaymentGateway, PaymentResult, PaymentStatus, WebhookData},
    traits::ShopError,
};

const SUPPORTED_CURRENCIES: [Currency; 3] = [Currency::USD, Currency::EUR, Currency::RUB];
const PAYMENT_LIFETIME_SECS: u32 = 3600;

pub struct CryptomusGateway {
    config: CryptomusConfig,
    client: Client,
}

impl CryptomusGateway {
    pub fn new(config: CryptomusConfig) -> Result<Self, ShopError> {
        let mut headers = HeaderMap::with_capacity(2);
        let merchant = HeaderValue::from_str(&config.merchant_id)
            .map_err(|e| ShopError::Gateway(format!("Invalid Cryptomus merchant id: {e}")))?;
        headers.insert("merchant", merchant);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ShopError::Gateway(format!("Could not build Cryptomus client: {e}")))?;
        Ok(Self { config, client })
    }

    fn sign_body(&self, body: &str) -> String {
        format!("{:x}", md5::compute(format!("{body}{}", self.config.api_key.reveal())))
    }

    /// Webhook signatures cover the url-encoded payload with keys sorted and the `sign` field
    /// removed.
    fn webhook_signature(&self, payload: &Value) -> Option<String> {
        let object = payload.as_object()?;
        let query = object
            .iter()
            .filter(|(k, _)| k.as_str() != "sign")
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{k}={}", urlencoding::encode(&value))
            })
            .collect::<Vec<String>>()
            .join("&");
        Some(self.sign_body(&query))
    }

    async fn api_request(&self, path: &str, body: Value) -> Option<Value> {
        let body = match serde_json::to_string(&body) {
            Ok(b) => b,
            Err(e) => {
                error!("🌖️ Could not serialize Cryptomus request: {e}");
                return None;
            },
        };
        let sign = self.sign_body(&body);
        let url = format!("{}{path}", self.config.base_url);
        trace!("🌖️ POST {url}");
        let response = self
            .client
            .request(Method::POST, url)
            .header("sign", sign)
            .body(body)
            .send()
            .await
            .map_err(|e| error!("🌖️ Cryptomus request failed: {e}"))
            .ok()?;
        if !response.status().is_success() {
            error!("🌖️ Cryptomus API error: {}", response.status());
            return None;
        }
        response.json::<Value>().await.map_err(|e| error!("🌖️ Invalid Cryptomus response: {e}")).ok()
    }

    fn map_status(status: &str) -> PaymentStatus {
        match status {
            "paid" | "paid_over" => PaymentStatus::Completed,
            "fail" | "wrong_amount" => PaymentStatus::Failed,
            "cancel" => PaymentStatus::Cancelled,
            "refund" | "refund_process" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

#[async_trait]
impl PaymentGateway for CryptomusGateway {
    fn name(&self) -> &'static str {
        "Cryptomus"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::Cryptomus
    }

    fn is_available(&self) -> bool {
        self.config.is_complete()
    }

    fn supported_currencies(&self) -> &[Currency] {
        &SUPPORTED_CURRENCIES
    }

    async fn create_payment(&self, data: &PaymentData) -> PaymentResult {
        if !self.is_available() {
            return PaymentResult::failure("Cryptomus gateway is not available");
        }
        let request = json!({
            "amount": data.amount.to_decimal_string(),
            "currency": data.amount.currency().as_str(),
            "order_id": data.order_id.as_str(),
            "url_return": data.return_url,
            "url_callback": data.webhook_url,
            "is_payment_multiple": false,
            "lifetime": PAYMENT_LIFETIME_SECS,
            "additional_data": json!({
                "user_id": data.user_id.as_str(),
                "product_id": data.product_id.as_str(),
            }).to_string(),
        });
        let Some(response) = self.api_request("/payment", request).await else {
            return PaymentResult::failure("Cryptomus API request failed");
        };
        if response["state"].as_i64() == Some(0) {
            let result = &response["result"];
            let uuid = result["uuid"].as_str().unwrap_or_default().to_string();
            debug!("🌖️ Created Cryptomus payment {uuid} for order {}", data.order_id);
            let mut payment = PaymentResult::ok(data.order_id.as_str()).with_external_id(uuid);
            if let Some(url) = result["url"].as_str() {
                payment = payment.with_url(url);
            }
            payment.with_metadata(json!({
                "to_currency": result["to_currency"],
                "expires_at": result["expired_at"],
            }))
        } else {
            let message = response["message"].as_str().unwrap_or("Unknown error");
            warn!("🌖️ Cryptomus rejected payment for order {}: {message}", data.order_id);
            PaymentResult::failure(format!("Cryptomus error: {message}"))
        }
    }

    async fn get_payment_status(&self, payment_id: &str) -> PaymentStatus {
        let Some(response) = self.api_request("/payment/info", json!({ "order_id": payment_id })).await else {
            return PaymentStatus::Pending;
        };
        if response["state"].as_i64() == Some(0) {
            let status = response["result"]["payment_status"].as_str().unwrap_or_default();
            Self::map_status(status)
        } else {
            PaymentStatus::Pending
        }
    }

    async fn handle_webhook(&self, payload: &Value) -> Option<WebhookData> {
        let signature = payload["sign"].as_str().unwrap_or_default();
        if !self.validate_webhook_signature(payload, signature) {
            warn!("🌖️ Rejected Cryptomus webhook with an invalid signature");
            return None;
        }
        let order_id = payload["order_id"].as_str()?;
        let uuid = payload["uuid"].as_str()?;
        let status = Self::map_status(payload["status"].as_str().unwrap_or_default());
        let mut data = WebhookData::new(order_id, status);
        data.external_payment_id = Some(uuid.to_string());
        data.raw_amount = payload["amount"].as_str().map(String::from);
        data.raw_currency = payload["currency"].as_str().map(String::from);
        if status == PaymentStatus::Failed {
            data.error_message = payload["message"].as_str().map(String::from);
        }
        Some(data)
    }

    fn validate_webhook_signature(&self, payload: &Value, signature: &str) -> bool {
        if signature.is_empty() {
            return false;
        }
        match self.webhook_signature(payload) {
            Some(expected) => expected == signature,
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use kiosk_common::Secret;
    use serde_json::json;

    use super::*;

    fn gateway() -> CryptomusGateway {
        let config = CryptomusConfig {
            enabled: true,
            api_key: Secret::new("test_api_key".to_string()),
            merchant_id: "merchant_1".to_string(),
            ..Default::default()
        };
        CryptomusGateway::new(config).unwrap()
    }

    fn signed_payload(gw: &CryptomusGateway, mut payload: Value) -> Value {
        let sign = gw.webhook_signature(&payload).unwrap();
        payload["sign"] = Value::String(sign);
        payload
    }

    #[test]
    fn availability_requires_both_credentials() {
        assert!(gateway().is_available());
        let incomplete = CryptomusGateway::new(CryptomusConfig {
            enabled: true,
            merchant_id: "merchant_1".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(!incomplete.is_available());
    }

    #[tokio::test]
    async fn valid_webhooks_are_normalized() {
        let gw = gateway();
        let payload = signed_payload(
            &gw,
            json!({
                "order_id": "ord_abc123",
                "uuid": "cm-uuid-1",
                "status": "paid",
                "amount": "29.99",
                "currency": "USD",
            }),
        );
        let data = gw.handle_webhook(&payload).await.unwrap();
        assert_eq!(data.payment_id, "ord_abc123");
        assert_eq!(data.external_payment_id.as_deref(), Some("cm-uuid-1"));
        assert_eq!(data.status, PaymentStatus::Completed);
        assert_eq!(data.raw_amount.as_deref(), Some("29.99"));
        assert_eq!(data.raw_currency.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn tampered_webhooks_are_dropped() {
        let gw = gateway();
        let mut payload = signed_payload(
            &gw,
            json!({
                "order_id": "ord_abc123",
                "uuid": "cm-uuid-1",
                "status": "paid",
                "amount": "29.99",
                "currency": "USD",
            }),
        );
        payload["amount"] = Value::String("0.01".to_string());
        assert!(gw.handle_webhook(&payload).await.is_none());
    }

    #[tokio::test]
    async fn webhooks_without_a_signature_are_dropped() {
        let gw = gateway();
        let payload = json!({ "order_id": "ord_abc123", "uuid": "u", "status": "paid" });
        assert!(gw.handle_webhook(&payload).await.is_none());
    }

    #[tokio::test]
    async fn failed_status_carries_the_gateway_message() {
        let gw = gateway();
        let payload = signed_payload(
            &gw,
            json!({
                "order_id": "ord_abc123",
                "uuid": "cm-uuid-2",
                "status": "fail",
                "message": "payment window lapsed",
            }),
        );
        let data = gw.handle_webhook(&payload).await.unwrap();
        assert_eq!(data.status, PaymentStatus::Failed);
        assert_eq!(data.error_message.as_deref(), Some("payment window lapsed"));
    }

    #[test]
    fn status_mapping_covers_the_provider_vocabulary() {
        assert_eq!(CryptomusGateway::map_status("paid_over"), PaymentStatus::Completed);
        assert_eq!(CryptomusGateway::map_status("cancel"), PaymentStatus::Cancelled);
        assert_eq!(CryptomusGateway::map_status("refund"), PaymentStatus::Refunded);
        assert_eq!(CryptomusGateway::map_status("process"), PaymentStatus::Pending);
        assert_eq!(CryptomusGateway::map_status("check"), PaymentStatus::Pending);
    }
}
