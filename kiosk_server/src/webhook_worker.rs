//! Asynchronous webhook processing.
//!
//! Payment providers expect a fast 2xx acknowledgement; anything slower (or a 5xx) triggers
//! their retry machinery. The webhook routes therefore only parse and enqueue the payload, and
//! this worker drives [`PaymentService::process_webhook`] off the request path.
use kiosk_engine::{db_types::PaymentMethod, traits::ShopDatabase, PaymentService};
use log::*;
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub method: PaymentMethod,
    pub payload: Value,
}

/// Cloneable handle the webhook routes use to hand payloads to the worker.
#[derive(Clone)]
pub struct WebhookSender {
    sender: mpsc::Sender<WebhookJob>,
}

impl WebhookSender {
    /// Enqueues a webhook for processing. Returns false if the queue is full or the worker has
    /// stopped; the route still acks the provider so that it retries later.
    pub fn enqueue(&self, job: WebhookJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                error!("📨️ Could not enqueue webhook. {e}");
                false
            },
        }
    }
}

/// Spawns the worker task. The worker stops once every [`WebhookSender`] has been dropped.
pub fn start_webhook_worker<B: ShopDatabase>(
    api: PaymentService<B>,
    buffer_size: usize,
) -> (WebhookSender, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<WebhookJob>(buffer_size);
    let handle = tokio::spawn(async move {
        debug!("📨️ Webhook worker started");
        while let Some(job) = receiver.recv().await {
            match api.process_webhook(job.method, &job.payload).await {
                Ok(order) => {
                    info!("📨️ {} webhook processed. Order {} is now {}", job.method, order.id, order.status)
                },
                Err(e) => warn!("📨️ Could not process {} webhook. {e}", job.method),
            }
        }
        debug!("📨️ Webhook worker shut down");
    });
    (WebhookSender { sender }, handle)
}
