use async_trait::async_trait;
use kiosk_common::{Currency, Money};
use serde_json::Value;

use crate::{
    db_types::PaymentMethod,
    gateways::{PaymentData, PaymentResult, PaymentStatus, WebhookData},
};

/// One upstream payment provider.
///
/// Implementations are cheap handles around an HTTP client and their configuration, shared behind
/// `Arc<dyn PaymentGateway>` by the factory. `create_payment` reports business failures through
/// [`PaymentResult::failure`], never by returning an error.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> PaymentMethod;

    /// Enabled and fully configured.
    fn is_available(&self) -> bool;

    fn supported_currencies(&self) -> &[Currency];

    async fn create_payment(&self, data: &PaymentData) -> PaymentResult;

    /// Best effort. Gateways without a status API report `Pending`.
    async fn get_payment_status(&self, payment_id: &str) -> PaymentStatus;

    /// Parses and verifies a raw webhook payload. `None` means the payload was unusable (which
    /// includes a bad signature) and nothing should change.
    async fn handle_webhook(&self, payload: &Value) -> Option<WebhookData>;

    async fn cancel_payment(&self, _payment_id: &str) -> bool {
        false
    }

    async fn refund_payment(&self, _payment_id: &str, _amount: Option<Money>) -> bool {
        false
    }

    /// Gateways without webhook signing accept everything.
    fn validate_webhook_signature(&self, _payload: &Value, _signature: &str) -> bool {
        true
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        self.supported_currencies().contains(&currency)
    }
}
