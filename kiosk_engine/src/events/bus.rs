//! Simple in-process pub-sub for domain events.
//!
//! The bus is fire-and-forget from the core's point of view: services drain the pending events of
//! an aggregate and hand them to an [`EventPublisher`]. The publisher is an explicit constructor
//! dependency of each service; there is no process-wide singleton. Handlers run as spawned tasks
//! and receive only the event itself, never internal engine state.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc;

use crate::events::ShopEvent;

pub type EventHandlerFn = Arc<dyn Fn(ShopEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventBus {
    listener: mpsc::Receiver<ShopEvent>,
    sender: mpsc::Sender<ShopEvent>,
    handler: EventHandlerFn,
}

impl EventBus {
    pub fn new(buffer_size: usize, handler: EventHandlerFn) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    /// A bus whose handler just logs each event. Useful until real consumers are wired up.
    pub fn logging(buffer_size: usize) -> Self {
        let handler: EventHandlerFn = Arc::new(|ev| {
            Box::pin(async move {
                info!("📬️ {} for order {}", ev.name(), ev.order_id());
            })
        });
        Self::new(buffer_size, handler)
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher { sender: self.sender.clone() }
    }

    /// Runs the bus until every publisher has been dropped, then drains in-flight handler tasks.
    pub async fn run(mut self) {
        debug!("📬️ Event bus started");
        // Drop the internal sender so the loop ends once the last external publisher is gone.
        drop(self.sender);
        let in_flight = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Dispatching {}", ev.name());
            let handler = Arc::clone(&self.handler);
            let counter = Arc::clone(&in_flight);
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                (handler)(ev).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while in_flight.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for event handlers to finish");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        debug!("📬️ Event bus shut down");
    }
}

/// Cloneable sending half of the [`EventBus`].
#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::Sender<ShopEvent>,
}

impl EventPublisher {
    /// Fire-and-forget: a failure to enqueue is logged, never surfaced to the business flow.
    pub async fn publish(&self, event: ShopEvent) {
        trace!("📬️ Publishing {} for order {}", event.name(), event.order_id());
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use kiosk_common::{Currency, Money};

    use super::*;
    use crate::{
        db_types::{OrderId, ProductId, UserId},
        events::{OrderCreatedEvent, ShopEvent},
    };

    fn created_event() -> ShopEvent {
        ShopEvent::OrderCreated(OrderCreatedEvent {
            order_id: OrderId::random(),
            user_id: UserId::random(),
            product_id: ProductId::random(),
            total: Money::from_cents(2999, Currency::USD).unwrap(),
            quantity: 1,
            is_trial: false,
        })
    }

    #[tokio::test]
    async fn all_published_events_reach_the_handler() {
        let _ = env_logger::try_init();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: EventHandlerFn = Arc::new(move |ev| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(ev);
            })
        });
        let bus = EventBus::new(4, handler);
        let publisher = bus.publisher();
        let producer = tokio::spawn(async move {
            for _ in 0..5 {
                publisher.publish(created_event()).await;
            }
            // publisher dropped here, letting the bus wind down
        });
        bus.run().await;
        producer.await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 5);
    }
}
