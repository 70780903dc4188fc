use kiosk_common::{Currency, Money};
use log::*;
use serde_json::Value;

use crate::{
    db_types::{OrderId, OrderStatus, PaymentMethod},
    entities::Order,
    events::EventPublisher,
    gateways::{PaymentData, PaymentGatewayFactory, PaymentResult, PaymentStatus, WebhookData},
    traits::{ShopDatabase, ShopError, UnitOfWork},
};

/// Aggregated result of one reconciliation pass over pending orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub checked: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub failures: usize,
}

/// Orchestrates everything that crosses the gateway boundary: opening payments, webhook
/// processing, refunds and pending-payment reconciliation.
///
/// Gateway HTTP calls never happen inside a unit of work; reads are done in one short
/// transaction, the gateway is called, and the results are written in a second one.
pub struct PaymentService<B> {
    db: B,
    gateways: PaymentGatewayFactory,
    publisher: EventPublisher,
}

impl<B> PaymentService<B> {
    pub fn new(db: B, gateways: PaymentGatewayFactory, publisher: EventPublisher) -> Self {
        Self { db, gateways, publisher }
    }

    pub fn gateways(&self) -> &PaymentGatewayFactory {
        &self.gateways
    }
}

impl<B> PaymentService<B>
where B: ShopDatabase
{
    /// Opens a payment for a pending order through the requested gateway (or the order's recorded
    /// method, or by currency as a last resort). On gateway success the payment details land on
    /// the order; on gateway failure the order is left untouched and the failure result is
    /// returned as-is.
    pub async fn create_payment(
        &self,
        order_id: &OrderId,
        method: Option<PaymentMethod>,
        return_url: Option<String>,
        webhook_url: Option<String>,
    ) -> Result<PaymentResult, ShopError> {
        let mut uow = self.db.begin().await?;
        let order = uow.fetch_order(order_id).await?.ok_or_else(|| ShopError::not_found("order", order_id.as_str()))?;
        if !order.can_be_paid() {
            return Err(ShopError::invalid_transition("create payment", order.status));
        }
        let user = uow
            .fetch_user(&order.user_id)
            .await?
            .ok_or_else(|| ShopError::not_found("user", order.user_id.as_str()))?;
        let product = uow
            .fetch_product(&order.product_id)
            .await?
            .ok_or_else(|| ShopError::not_found("product", order.product_id.as_str()))?;
        uow.rollback().await?;

        let total = order.total_amount()?;
        let method = method.or(order.payment_method);
        let gateway = match method {
            Some(m) => self.gateways.get_gateway(m).ok_or(ShopError::GatewayUnavailable(m))?,
            None => self
                .gateways
                .gateway_for_currency(total.currency())
                .ok_or_else(|| ShopError::Gateway(format!("No gateway accepts {}", total.currency())))?,
        };
        let data = PaymentData {
            order_id: order.id.clone(),
            user_id: user.id.clone(),
            product_id: product.id.clone(),
            amount: total,
            description: product.name.clone(),
            user_telegram_id: user.telegram_id,
            webhook_url,
            return_url,
        };
        let result = gateway.create_payment(&data).await;
        if !result.success {
            warn!(
                "🔄️💰️ {} declined to open a payment for order {}: {}",
                gateway.name(),
                order.id,
                result.error_message.as_deref().unwrap_or("no reason given")
            );
            return Ok(result);
        }
        let payment_id = result.payment_id.clone().unwrap_or_else(|| order.id.to_string());
        let mut uow = self.db.begin().await?;
        let mut order = uow.fetch_order(order_id).await?.ok_or_else(|| ShopError::not_found("order", order_id.as_str()))?;
        order.set_payment_details(
            gateway.method(),
            payment_id,
            result.external_payment_id.clone(),
            result.payment_url.clone(),
        )?;
        uow.update_order(&order).await?;
        uow.commit().await?;
        info!("🔄️💰️ Opened {} payment for order {}", gateway.name(), order.id);
        Ok(result)
    }

    /// Ingests a raw gateway webhook.
    ///
    /// The signature is verified by the gateway before any order state is read; a bad payload is
    /// logged and rejected without touching anything. Redeliveries of the same "paid" webhook are
    /// no-ops once the order is paid or completed.
    pub async fn process_webhook(&self, method: PaymentMethod, payload: &Value) -> Result<Order, ShopError> {
        let gateway = self.gateways.get_gateway(method).ok_or(ShopError::GatewayUnavailable(method))?;
        let Some(webhook) = gateway.handle_webhook(payload).await else {
            warn!("🛡️ Rejected {method} webhook: invalid signature or malformed payload");
            return Err(ShopError::WebhookRejected(format!("Invalid {method} webhook")));
        };
        let mut uow = self.db.begin().await?;
        let order = match uow.fetch_order(&OrderId::from(webhook.payment_id.as_str())).await? {
            Some(order) => Some(order),
            None => uow.fetch_order_by_payment_id(&webhook.payment_id).await?,
        };
        let mut order = order.ok_or_else(|| ShopError::not_found("order", &webhook.payment_id))?;
        cross_check_amount(&order, &webhook)?;

        let events = match webhook.status {
            PaymentStatus::Completed => {
                if matches!(order.status, OrderStatus::Paid | OrderStatus::Completed) {
                    debug!("🔄️💰️ Duplicate paid webhook for order {}, ignoring", order.id);
                    uow.rollback().await?;
                    return Ok(order);
                }
                if order.external_payment_id.is_none() {
                    order.external_payment_id = webhook.external_payment_id.clone();
                }
                order.mark_as_paid()?;
                uow.update_order(&order).await?;
                order.take_events()
            },
            PaymentStatus::Failed | PaymentStatus::Cancelled => {
                if order.status.is_terminal() {
                    debug!("🔄️💰️ {method} webhook for already closed order {}, ignoring", order.id);
                    uow.rollback().await?;
                    return Ok(order);
                }
                if order.status == OrderStatus::Pending {
                    let mut product = uow
                        .fetch_product(&order.product_id)
                        .await?
                        .ok_or_else(|| ShopError::not_found("product", order.product_id.as_str()))?;
                    product.increase_stock(order.quantity);
                    uow.update_product(&product).await?;
                }
                let reason = webhook.error_message.clone().unwrap_or_else(|| format!("{method} payment failed"));
                order.cancel(Some(reason))?;
                uow.update_order(&order).await?;
                order.take_events()
            },
            PaymentStatus::Refunded => {
                if order.status == OrderStatus::Refunded {
                    uow.rollback().await?;
                    return Ok(order);
                }
                order.refund(Some(format!("{method} refund notification")))?;
                uow.update_order(&order).await?;
                order.take_events()
            },
            PaymentStatus::Pending => {
                trace!("🔄️💰️ Informational {method} webhook for order {}, no state change", order.id);
                uow.rollback().await?;
                return Ok(order);
            },
        };
        uow.commit().await?;
        for event in events {
            self.publisher.publish(event).await;
        }
        info!("🔄️💰️ Processed {method} webhook for order {} → {}", order.id, order.status);
        Ok(order)
    }

    /// Refunds a paid order through its gateway. The order must carry the payment id and method
    /// recorded when the payment was opened.
    pub async fn refund_payment(&self, order_id: &OrderId, reason: Option<String>) -> Result<Order, ShopError> {
        let mut uow = self.db.begin().await?;
        let order = uow.fetch_order(order_id).await?.ok_or_else(|| ShopError::not_found("order", order_id.as_str()))?;
        uow.rollback().await?;
        if order.status != OrderStatus::Paid {
            return Err(ShopError::invalid_transition("refund payment", order.status));
        }
        let (Some(payment_id), Some(method)) = (order.payment_id.clone(), order.payment_method) else {
            return Err(ShopError::Validation(format!("Order {} has no payment to refund", order.id)));
        };
        let gateway = self.gateways.get_gateway(method).ok_or(ShopError::GatewayUnavailable(method))?;
        let total = order.total_amount()?;
        if !gateway.refund_payment(&payment_id, Some(total)).await {
            return Err(ShopError::Gateway(format!("{} did not accept the refund for order {}", gateway.name(), order.id)));
        }
        let mut uow = self.db.begin().await?;
        let mut order = uow.fetch_order(order_id).await?.ok_or_else(|| ShopError::not_found("order", order_id.as_str()))?;
        order.refund(reason.or_else(|| Some("refunded".to_string())))?;
        uow.update_order(&order).await?;
        let events = order.take_events();
        uow.commit().await?;
        for event in events {
            self.publisher.publish(event).await;
        }
        info!("🔄️💰️ Refunded order {} via {}", order.id, gateway.name());
        Ok(order)
    }

    /// Best-effort status probe against the order's gateway.
    pub async fn check_payment_status(&self, order_id: &OrderId) -> Result<PaymentStatus, ShopError> {
        let mut uow = self.db.begin().await?;
        let order = uow.fetch_order(order_id).await?.ok_or_else(|| ShopError::not_found("order", order_id.as_str()))?;
        uow.rollback().await?;
        let (Some(payment_id), Some(method)) = (order.payment_id.clone(), order.payment_method) else {
            return Err(ShopError::Validation(format!("Order {} has no payment to check", order.id)));
        };
        let gateway = self.gateways.get_gateway(method).ok_or(ShopError::GatewayUnavailable(method))?;
        Ok(gateway.get_payment_status(&payment_id).await)
    }

    /// Sweeps pending orders that have an open payment and asks their gateways for the verdict.
    /// Confirmed payments are marked paid, dead ones cancelled with their stock released. One
    /// order's failure is logged and skipped.
    pub async fn reconcile_pending_payments(&self) -> Result<ReconcileOutcome, ShopError> {
        let mut uow = self.db.begin().await?;
        let pending = uow.fetch_orders_by_status(OrderStatus::Pending).await?;
        uow.rollback().await?;
        let mut outcome = ReconcileOutcome::default();
        for order in pending {
            let (Some(payment_id), Some(method)) = (order.payment_id.clone(), order.payment_method) else {
                continue;
            };
            let Some(gateway) = self.gateways.get_gateway(method) else {
                continue;
            };
            outcome.checked += 1;
            let status = gateway.get_payment_status(&payment_id).await;
            let result = match status {
                PaymentStatus::Completed => self.settle_reconciled(&order.id, true).await,
                PaymentStatus::Failed | PaymentStatus::Cancelled => self.settle_reconciled(&order.id, false).await,
                _ => continue,
            };
            match result {
                Ok(true) if status == PaymentStatus::Completed => outcome.confirmed += 1,
                Ok(true) => outcome.cancelled += 1,
                Ok(false) => {},
                Err(e) => {
                    warn!("🔄️💰️ Reconciliation failed for order {}: {e}", order.id);
                    outcome.failures += 1;
                },
            }
        }
        if outcome.checked > 0 {
            info!(
                "🔄️💰️ Reconciled {} pending payments: {} confirmed, {} cancelled, {} failures",
                outcome.checked, outcome.confirmed, outcome.cancelled, outcome.failures
            );
        }
        Ok(outcome)
    }

    /// Applies a reconciliation verdict in its own unit of work, re-checking the order is still
    /// pending. Returns whether anything changed.
    async fn settle_reconciled(&self, order_id: &OrderId, paid: bool) -> Result<bool, ShopError> {
        let mut uow = self.db.begin().await?;
        let Some(mut order) = uow.fetch_order(order_id).await? else {
            return Ok(false);
        };
        if order.status != OrderStatus::Pending {
            uow.rollback().await?;
            return Ok(false);
        }
        if paid {
            order.mark_as_paid()?;
        } else {
            let mut product = uow
                .fetch_product(&order.product_id)
                .await?
                .ok_or_else(|| ShopError::not_found("product", order.product_id.as_str()))?;
            product.increase_stock(order.quantity);
            uow.update_product(&product).await?;
            order.cancel(Some("payment failed at the gateway".to_string()))?;
        }
        uow.update_order(&order).await?;
        let events = order.take_events();
        uow.commit().await?;
        for event in events {
            self.publisher.publish(event).await;
        }
        Ok(true)
    }
}

/// Rejects a webhook whose reported amount contradicts the order total. Amounts in a different
/// currency (e.g. a Stars conversion of a USD price) cannot be compared and are let through.
fn cross_check_amount(order: &Order, webhook: &WebhookData) -> Result<(), ShopError> {
    let (Some(raw_amount), Some(raw_currency)) = (&webhook.raw_amount, &webhook.raw_currency) else {
        return Ok(());
    };
    let total = order.total_amount()?;
    let Ok(currency) = raw_currency.parse::<Currency>() else {
        return Err(ShopError::WebhookRejected(format!("Unparseable webhook currency {raw_currency}")));
    };
    if currency != total.currency() {
        return Ok(());
    }
    let reported = Money::from_decimal_str(raw_amount, currency)
        .map_err(|e| ShopError::WebhookRejected(format!("Unparseable webhook amount: {e}")))?;
    if reported != total {
        warn!("🛡️ Webhook amount {reported} does not match order {} total {total}", order.id);
        return Err(ShopError::WebhookRejected(format!(
            "Amount mismatch for order {}: reported {reported}, expected {total}",
            order.id
        )));
    }
    Ok(())
}
