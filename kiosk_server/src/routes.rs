use actix_web::{get, web, HttpResponse, Responder};
use kiosk_engine::{
    db_types::{OrderId, PaymentMethod},
    services::CreateOrderRequest,
    traits::ShopDatabase,
    OrderService,
    PaymentService,
};
use log::*;
use serde_json::Value;

use crate::{
    config::ServerConfig,
    data_objects::{CancelOrderRequest, JsonResponse, NewOrderRequest, NewPaymentRequest, RefundOrderRequest},
    errors::ServerError,
    webhook_worker::{WebhookJob, WebhookSender},
};

//----------------------------------------------   Health  ----------------------------------------------------

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("🩺️ Heartbeat check");
    "👍️\n"
}

//----------------------------------------------   Storefront API  --------------------------------------------

pub fn api_routes<B: ShopDatabase>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/orders", web::post().to(create_order::<B>))
            .route("/orders/{id}", web::get().to(order_by_id::<B>))
            .route("/orders/{id}/payments", web::post().to(create_payment::<B>))
            .route("/orders/{id}/cancel", web::post().to(cancel_order::<B>))
            .route("/orders/{id}/refund", web::post().to(refund_order::<B>))
            .route("/payment-methods", web::get().to(payment_methods::<B>)),
    );
}

pub async fn create_order<B: ShopDatabase>(
    api: web::Data<OrderService<B>>,
    body: web::Json<NewOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    let request = CreateOrderRequest::from(body.into_inner());
    debug!("🛒️ New order request from user {} for product {}", request.user_id, request.product_id);
    let order = api.create_order(request).await?;
    info!("🛒️ Order {} created for {}", order.id, order.total_amount()?);
    Ok(HttpResponse::Ok().json(order))
}

pub async fn order_by_id<B: ShopDatabase>(
    api: web::Data<OrderService<B>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let id = OrderId::from(path.into_inner());
    let order = api.order(&id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Order {id}")))?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn create_payment<B: ShopDatabase>(
    api: web::Data<PaymentService<B>>,
    config: web::Data<ServerConfig>,
    path: web::Path<String>,
    body: web::Json<NewPaymentRequest>,
) -> Result<HttpResponse, ServerError> {
    let id = OrderId::from(path.into_inner());
    let request = body.into_inner();
    let webhook_url = request
        .webhook_url
        .or_else(|| request.method.and_then(|m| config.webhook_url_for(provider_segment(m))));
    let result = api.create_payment(&id, request.method, request.return_url, webhook_url).await?;
    if result.success {
        info!("💳️ Payment created for order {id}");
    } else {
        warn!("💳️ Payment for order {id} was declined. {}", result.error_message.as_deref().unwrap_or("No reason given"));
    }
    Ok(HttpResponse::Ok().json(result))
}

pub async fn cancel_order<B: ShopDatabase>(
    api: web::Data<OrderService<B>>,
    path: web::Path<String>,
    body: web::Json<CancelOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    let id = OrderId::from(path.into_inner());
    let order = api.cancel_order(&id, body.into_inner().reason).await?;
    info!("🛒️ Order {} cancelled", order.id);
    Ok(HttpResponse::Ok().json(order))
}

pub async fn refund_order<B: ShopDatabase>(
    api: web::Data<PaymentService<B>>,
    path: web::Path<String>,
    body: web::Json<RefundOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    let id = OrderId::from(path.into_inner());
    let order = api.refund_payment(&id, body.into_inner().reason).await?;
    info!("💳️ Order {} refunded", order.id);
    Ok(HttpResponse::Ok().json(order))
}

pub async fn payment_methods<B: ShopDatabase>(api: web::Data<PaymentService<B>>) -> Result<HttpResponse, ServerError> {
    let methods: Vec<Value> = api
        .gateways()
        .available_gateways()
        .into_iter()
        .map(|gw| {
            serde_json::json!({
                "method": gw.method(),
                "name": gw.name(),
                "currencies": gw.supported_currencies(),
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(methods))
}

//----------------------------------------------   Webhooks  --------------------------------------------------

pub fn webhook_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/{provider}", web::post().to(payment_webhook)));
}

pub(crate) fn provider_segment(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cryptomus => "cryptomus",
        PaymentMethod::TelegramStars => "telegram",
        PaymentMethod::Manual => "manual",
    }
}

pub async fn payment_webhook(
    sender: web::Data<WebhookSender>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> HttpResponse {
    let provider = path.into_inner();
    let method = match provider.as_str() {
        "cryptomus" => PaymentMethod::Cryptomus,
        "telegram" => PaymentMethod::TelegramStars,
        "manual" => PaymentMethod::Manual,
        other => {
            warn!("📨️ Webhook for unknown provider '{other}' dropped");
            return HttpResponse::NotFound().json(JsonResponse::failure(format!("Unknown provider: {other}")));
        },
    };
    trace!("📨️ Received {method} webhook");
    // Providers retry on anything outside the 200 range, so the response is always an ack;
    // verification and state changes happen on the worker.
    if sender.enqueue(WebhookJob { method, payload: body.into_inner() }) {
        HttpResponse::Ok().json(JsonResponse::success("Accepted"))
    } else {
        HttpResponse::Ok().json(JsonResponse::failure("Busy, retry later"))
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use actix_web::{test, App};
    use kiosk_common::{Currency, Money};
    use kiosk_engine::{
        db_types::OrderStatus,
        entities::{Order, Product, User},
        events::EventBus,
        gateways::{PaymentGatewayFactory, PaymentResult},
        test_utils::{MemoryDatabase, MockGateway},
    };
    use serde_json::json;

    use super::*;
    use crate::webhook_worker::start_webhook_worker;

    struct TestHarness {
        db: MemoryDatabase,
        gateway: Arc<MockGateway>,
        user: User,
        product: Product,
        // Keeps the event channel open for the duration of the test.
        _bus: EventBus,
    }

    fn harness() -> TestHarness {
        let _ = env_logger::try_init();
        let db = MemoryDatabase::new();
        let user = User::new(Some(777), Some("alice".to_string()));
        let product = Product::new(
            "Starter plan",
            "30 days of access",
            Money::from_cents(2999, Currency::USD).unwrap(),
            30,
            10,
        )
        .unwrap();
        db.add_user(user.clone());
        db.add_product(product.clone());
        let gateway = Arc::new(MockGateway::new(PaymentMethod::Cryptomus));
        gateway.succeed_with_url("https://pay.example.com/abc");
        let bus = EventBus::logging(64);
        TestHarness { db, gateway, user, product, _bus: bus }
    }

    impl TestHarness {
        fn orders(&self) -> OrderService<MemoryDatabase> {
            OrderService::new(self.db.clone(), self._bus.publisher())
        }

        fn payments(&self) -> PaymentService<MemoryDatabase> {
            let factory = PaymentGatewayFactory::from_gateways(vec![self.gateway.clone()]);
            PaymentService::new(self.db.clone(), factory, self._bus.publisher())
        }

        fn new_order_body(&self) -> Value {
            json!({
                "user_id": self.user.id.as_str(),
                "product_id": self.product.id.as_str(),
                "quantity": 1,
                "payment_method": "cryptomus",
            })
        }
    }

    macro_rules! test_app {
        ($h:expr) => {{
            let (sender, _worker) = start_webhook_worker($h.payments(), 16);
            test::init_service(
                App::new()
                    .app_data(web::Data::new($h.orders()))
                    .app_data(web::Data::new($h.payments()))
                    .app_data(web::Data::new(sender))
                    .app_data(web::Data::new(ServerConfig::default()))
                    .service(health)
                    .configure(api_routes::<MemoryDatabase>)
                    .configure(webhook_routes),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn orders_can_be_created_and_fetched() {
        let h = harness();
        let app = test_app!(h);
        let req = test::TestRequest::post().uri("/api/orders").set_json(h.new_order_body()).to_request();
        let order: Order = test::call_and_read_body_json(&app, req).await;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount().unwrap(), h.product.price);

        let req = test::TestRequest::get().uri(&format!("/api/orders/{}", order.id)).to_request();
        let fetched: Order = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched.id, order.id);
        // Stock was reserved as part of order creation
        assert_eq!(h.db.product(&h.product.id).unwrap().stock, 9);
    }

    #[actix_web::test]
    async fn missing_orders_are_a_404_with_a_json_error() {
        let h = harness();
        let app = test_app!(h);
        let req = test::TestRequest::get().uri("/api/orders/ord_doesnotexist").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[actix_web::test]
    async fn out_of_stock_orders_are_a_409() {
        let h = harness();
        let app = test_app!(h);
        let mut body = h.new_order_body();
        body["quantity"] = json!(50);
        let req = test::TestRequest::post().uri("/api/orders").set_json(body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn payments_return_the_provider_url() {
        let h = harness();
        let app = test_app!(h);
        let req = test::TestRequest::post().uri("/api/orders").set_json(h.new_order_body()).to_request();
        let order: Order = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/orders/{}/payments", order.id))
            .set_json(json!({}))
            .to_request();
        let result: PaymentResult = test::call_and_read_body_json(&app, req).await;
        assert!(result.success);
        assert_eq!(result.payment_url.as_deref(), Some("https://pay.example.com/abc"));
        let stored = h.db.order(&order.id).unwrap();
        assert!(stored.payment_id.is_some());
    }

    #[actix_web::test]
    async fn webhooks_ack_immediately_and_settle_the_order_off_path() {
        let h = harness();
        let app = test_app!(h);
        let req = test::TestRequest::post().uri("/api/orders").set_json(h.new_order_body()).to_request();
        let order: Order = test::call_and_read_body_json(&app, req).await;
        let req = test::TestRequest::post()
            .uri(&format!("/api/orders/{}/payments", order.id))
            .set_json(json!({}))
            .to_request();
        let result: PaymentResult = test::call_and_read_body_json(&app, req).await;
        let payment_id = result.payment_id.unwrap();

        let req = test::TestRequest::post()
            .uri("/webhook/cryptomus")
            .set_json(json!({
                "payment_id": payment_id,
                "status": "completed",
                "amount": "29.99",
                "currency": "USD",
                "sign": "valid",
            }))
            .to_request();
        let ack: JsonResponse = test::call_and_read_body_json(&app, req).await;
        assert!(ack.success);

        // The worker settles the order asynchronously
        let mut status = OrderStatus::Pending;
        for _ in 0..100 {
            status = h.db.order(&order.id).unwrap().status;
            if status != OrderStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, OrderStatus::Paid);
    }

    #[actix_web::test]
    async fn unknown_webhook_providers_are_rejected() {
        let h = harness();
        let app = test_app!(h);
        let req = test::TestRequest::post().uri("/webhook/paypal").set_json(json!({})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn payment_methods_lists_available_gateways() {
        let h = harness();
        let app = test_app!(h);
        let req = test::TestRequest::get().uri("/api/payment-methods").to_request();
        let methods: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0]["method"], "cryptomus");
    }
}
