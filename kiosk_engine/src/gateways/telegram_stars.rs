//! Telegram Stars gateway.
//!
//! Opening a payment sends an invoice through the Bot API; confirmation arrives as a
//! `successful_payment` update relayed by the bot front-end. There is no status API, so
//! [`get_payment_status`](super::PaymentGateway::get_payment_status) always reports pending and
//! reconciliation relies on webhooks alone.
use async_trait::async_trait;
use kiosk_common::{Currency, Money};
use log::*;
use reqwest::Client;
use serde_json::{json, Value};

use crate::{
    db_types::PaymentMethod,
    gateways::{PaymentData, PaymentGateway, PaymentResult, PaymentStatus, TelegramStarsConfig, WebhookData},
    traits::ShopError,
};

const SUPPORTED_CURRENCIES: [Currency; 4] = [Currency::XTR, Currency::USD, Currency::EUR, Currency::RUB];

pub struct TelegramStarsGateway {
    config: TelegramStarsConfig,
    client: Client,
}

impl TelegramStarsGateway {
    pub fn new(config: TelegramStarsConfig) -> Result<Self, ShopError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ShopError::Gateway(format!("Could not build Telegram client: {e}")))?;
        Ok(Self { config, client })
    }

    fn bot_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.config.base_url, self.config.bot_token.reveal())
    }

    /// Converts an amount into whole Stars using fixed indicative rates. Real exchange rates are
    /// out of scope; these match what the storefront advertises.
    fn to_stars(amount: Money) -> Option<i64> {
        let cents = amount.cents();
        let stars = match amount.currency() {
            Currency::XTR => cents / 100,
            Currency::USD => cents,
            Currency::EUR => cents * 110 / 100,
            Currency::RUB => cents / 100,
            _ => return None,
        };
        Some(stars.max(1))
    }

    async fn call_bot_api(&self, method: &str, body: Value) -> Option<Value> {
        let response = self
            .client
            .post(self.bot_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| error!("⭐️ Telegram API request failed: {e}"))
            .ok()?;
        let body = response.json::<Value>().await.map_err(|e| error!("⭐️ Invalid Telegram response: {e}")).ok()?;
        if body["ok"].as_bool() == Some(true) {
            Some(body["result"].clone())
        } else {
            let description = body["description"].as_str().unwrap_or("unknown error");
            error!("⭐️ Telegram API error: {description}");
            None
        }
    }
}

#[async_trait]
impl PaymentGateway for TelegramStarsGateway {
    fn name(&self) -> &'static str {
        "Telegram Stars"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::TelegramStars
    }

    fn is_available(&self) -> bool {
        self.config.is_complete()
    }

    fn supported_currencies(&self) -> &[Currency] {
        &SUPPORTED_CURRENCIES
    }

    async fn create_payment(&self, data: &PaymentData) -> PaymentResult {
        if !self.is_available() {
            return PaymentResult::failure("Telegram Stars gateway is not available");
        }
        let Some(chat_id) = data.user_telegram_id else {
            return PaymentResult::failure("Telegram Stars payments require a telegram id");
        };
        let Some(stars) = Self::to_stars(data.amount) else {
            return PaymentResult::failure(format!("Unsupported currency for Telegram Stars: {}", data.amount.currency()));
        };
        let body = json!({
            "chat_id": chat_id,
            "title": data.description,
            "description": format!("Order {}", data.order_id),
            "payload": data.order_id.as_str(),
            // Empty provider token selects Stars
            "provider_token": "",
            "currency": "XTR",
            "prices": [{ "label": data.description, "amount": stars }],
            "start_parameter": format!("order_{}", data.order_id),
        });
        let Some(result) = self.call_bot_api("sendInvoice", body).await else {
            return PaymentResult::failure("Failed to send Telegram invoice");
        };
        debug!("⭐️ Sent invoice for order {} ({stars} stars)", data.order_id);
        PaymentResult::ok(data.order_id.as_str()).with_metadata(json!({
            "message_id": result["message_id"],
            "stars_amount": stars,
            "original_amount": data.amount.to_decimal_string(),
            "original_currency": data.amount.currency().as_str(),
        }))
    }

    async fn get_payment_status(&self, _payment_id: &str) -> PaymentStatus {
        PaymentStatus::Pending
    }

    async fn handle_webhook(&self, payload: &Value) -> Option<WebhookData> {
        let payment = payload.get("successful_payment")?;
        let order_ref = payment["invoice_payload"].as_str()?;
        let charge_id = payment["telegram_payment_charge_id"].as_str();
        let total_amount = payment["total_amount"].as_i64().unwrap_or(0);
        let currency = payment["currency"].as_str().unwrap_or("XTR");
        let mut data = WebhookData::new(order_ref, PaymentStatus::Completed);
        data.external_payment_id = charge_id.map(String::from);
        // total_amount arrives in minor units
        data.raw_amount = Some(format!("{}.{:02}", total_amount / 100, total_amount % 100));
        data.raw_currency = Some(currency.to_string());
        Some(data)
    }
}

#[cfg(test)]
mod test {
    use kiosk_common::Secret;
    use serde_json::json;

    use super::*;

    fn gateway() -> TelegramStarsGateway {
        let config = TelegramStarsConfig {
            enabled: true,
            bot_token: Secret::new("123:token".to_string()),
            ..Default::default()
        };
        TelegramStarsGateway::new(config).unwrap()
    }

    #[test]
    fn star_conversion_uses_fixed_rates() {
        let usd = Money::from_cents(2999, Currency::USD).unwrap();
        assert_eq!(TelegramStarsGateway::to_stars(usd), Some(2999));
        let xtr = Money::from_cents(500, Currency::XTR).unwrap();
        assert_eq!(TelegramStarsGateway::to_stars(xtr), Some(5));
        // Tiny amounts round up to the minimum of one star
        let dust = Money::from_cents(10, Currency::RUB).unwrap();
        assert_eq!(TelegramStarsGateway::to_stars(dust), Some(1));
    }

    #[tokio::test]
    async fn successful_payment_updates_are_normalized() {
        let gw = gateway();
        let payload = json!({
            "successful_payment": {
                "invoice_payload": "ord_abc123",
                "currency": "XTR",
                "total_amount": 2999,
                "telegram_payment_charge_id": "tg_charge_1",
            }
        });
        let data = gw.handle_webhook(&payload).await.unwrap();
        assert_eq!(data.payment_id, "ord_abc123");
        assert_eq!(data.status, PaymentStatus::Completed);
        assert_eq!(data.external_payment_id.as_deref(), Some("tg_charge_1"));
        assert_eq!(data.raw_amount.as_deref(), Some("29.99"));
        assert_eq!(data.raw_currency.as_deref(), Some("XTR"));
    }

    #[tokio::test]
    async fn unrelated_updates_are_ignored() {
        let gw = gateway();
        assert!(gw.handle_webhook(&json!({ "message": { "text": "hi" } })).await.is_none());
        assert!(gw.handle_webhook(&json!({ "successful_payment": {} })).await.is_none());
    }

    #[tokio::test]
    async fn payments_without_a_telegram_id_fail_cleanly() {
        let gw = gateway();
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
        let result = gw.create_payment(&data).await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("telegram id"));
    }
}
