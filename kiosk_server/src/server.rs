use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use kiosk_engine::{
    events::{EventBus, EventPublisher},
    gateways::PaymentGatewayFactory,
    scheduler::{TaskHandler, TaskScheduler},
    traits::ShopDatabase,
    OrderService,
    PaymentService,
    SqliteDatabase,
};
use log::*;
use tokio::sync::watch;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    routes::{api_routes, health, webhook_routes},
    webhook_worker::{start_webhook_worker, WebhookSender},
};

const EVENT_BUS_BUFFER: usize = 100;
const WEBHOOK_QUEUE_BUFFER: usize = 100;

/// Brings up the full stack: database, event bus, webhook worker, background jobs and the HTTP
/// server. Returns once the HTTP server stops, after draining the background machinery.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let bus = EventBus::logging(EVENT_BUS_BUFFER);
    let publisher = bus.publisher();
    let bus_handle = tokio::spawn(bus.run());

    let gateways = PaymentGatewayFactory::new(config.payments.clone());
    let orders = OrderService::new(db.clone(), publisher.clone())
        .with_payment_window(chrono::Duration::minutes(config.payment_window_minutes));
    let payments = PaymentService::new(db.clone(), gateways.clone(), publisher.clone());
    let (webhook_sender, worker_handle) = start_webhook_worker(
        PaymentService::new(db.clone(), gateways.clone(), publisher.clone()),
        WEBHOOK_QUEUE_BUFFER,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = build_scheduler(&config, db, gateways, &publisher);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));
    drop(publisher);

    let srv = create_server_instance(config, orders, payments, webhook_sender)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));

    info!("🚀️ Server stopped. Draining background tasks.");
    let _ = shutdown_tx.send(true);
    drop(shutdown_tx);
    if let Err(e) = scheduler_handle.await {
        warn!("🚀️ Scheduler task panicked. {e}");
    }
    if let Err(e) = worker_handle.await {
        warn!("🚀️ Webhook worker panicked. {e}");
    }
    if let Err(e) = bus_handle.await {
        warn!("🚀️ Event bus task panicked. {e}");
    }
    result
}

/// The periodic jobs: the expired-order sweep and payment reconciliation. Each failure backs the
/// job off; repeated failures disable it until re-enabled.
fn build_scheduler<B: ShopDatabase>(
    config: &ServerConfig,
    db: B,
    gateways: PaymentGatewayFactory,
    publisher: &EventPublisher,
) -> TaskScheduler {
    let mut scheduler = TaskScheduler::new();

    let sweep_api = Arc::new(OrderService::new(db.clone(), publisher.clone()));
    let sweep: TaskHandler = Arc::new(move || {
        let api = Arc::clone(&sweep_api);
        Box::pin(async move {
            let outcome = api.process_expired_orders().await?;
            if outcome.expired > 0 || outcome.failures > 0 {
                info!(
                    "🕰️ Expiry sweep done. {} expired, {} skipped, {} failures",
                    outcome.expired, outcome.skipped, outcome.failures
                );
            }
            Ok(())
        })
    });
    scheduler.add_task("expire_orders", config.sweep_interval, sweep);

    let reconcile_api = Arc::new(PaymentService::new(db, gateways, publisher.clone()));
    let reconcile: TaskHandler = Arc::new(move || {
        let api = Arc::clone(&reconcile_api);
        Box::pin(async move {
            let outcome = api.reconcile_pending_payments().await?;
            if outcome.checked > 0 {
                info!(
                    "🕰️ Reconciliation done. {} checked, {} confirmed, {} cancelled, {} failures",
                    outcome.checked, outcome.confirmed, outcome.cancelled, outcome.failures
                );
            }
            Ok(())
        })
    });
    scheduler.add_task("reconcile_payments", config.reconcile_interval, reconcile);

    scheduler
}

pub fn create_server_instance<B: ShopDatabase>(
    config: ServerConfig,
    orders: OrderService<B>,
    payments: PaymentService<B>,
    webhooks: WebhookSender,
) -> Result<Server, ServerError> {
    let orders = web::Data::new(orders);
    let payments = web::Data::new(payments);
    let webhooks = web::Data::new(webhooks);
    let config_data = web::Data::new(config.clone());
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("kiosk::access_log"))
            .app_data(orders.clone())
            .app_data(payments.clone())
            .app_data(webhooks.clone())
            .app_data(config_data.clone())
            .service(health)
            .configure(api_routes::<B>)
            .configure(webhook_routes)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
