//! Payment gateway abstraction and the concrete gateways behind it.
//!
//! Each gateway adapts one upstream payment provider to the [`PaymentGateway`] trait. Gateways
//! never throw for business failures; [`PaymentResult`] carries `success=false` with an error
//! message instead. The [`PaymentGatewayFactory`] builds and caches only the gateways whose
//! configuration is enabled and structurally complete.
mod config;
mod cryptomus;
mod data_objects;
mod factory;
mod gateway;
mod manual;
mod telegram_stars;

pub use config::{
    CryptomusConfig,
    ManualConfig,
    PaymentsConfig,
    TelegramStarsConfig,
    DEFAULT_CRYPTOMUS_API_URL,
    DEFAULT_TELEGRAM_API_URL,
};
pub use cryptomus::CryptomusGateway;
pub use data_objects::{PaymentData, PaymentResult, PaymentStatus, WebhookData};
pub use factory::PaymentGatewayFactory;
pub use gateway::PaymentGateway;
pub use manual::ManualGateway;
pub use telegram_stars::TelegramStarsGateway;
