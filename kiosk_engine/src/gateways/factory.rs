use std::{collections::HashMap, sync::Arc};

use kiosk_common::Currency;
use log::*;

use crate::{
    db_types::PaymentMethod,
    gateways::{CryptomusGateway, ManualGateway, PaymentGateway, PaymentsConfig, TelegramStarsGateway},
};

/// Gateways are tried in this order when selecting by currency. Stars first for XTR, crypto as
/// the general fallback, manual last.
const CURRENCY_PRIORITY: [PaymentMethod; 3] = [PaymentMethod::TelegramStars, PaymentMethod::Cryptomus, PaymentMethod::Manual];

/// Builds and caches the configured gateways.
///
/// Only gateways whose configuration is enabled and structurally complete are constructed at all;
/// [`get_gateway`](Self::get_gateway) returning `None` is an ordinary checked outcome, not an
/// error.
#[derive(Clone)]
pub struct PaymentGatewayFactory {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl PaymentGatewayFactory {
    pub fn new(config: PaymentsConfig) -> Self {
        let mut gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>> = HashMap::new();
        if config.telegram_stars.enabled {
            if config.telegram_stars.is_complete() {
                match TelegramStarsGateway::new(config.telegram_stars) {
                    Ok(gw) => {
                        info!("🏭️ Telegram Stars gateway initialized");
                        gateways.insert(PaymentMethod::TelegramStars, Arc::new(gw));
                    },
                    Err(e) => error!("🏭️ Could not initialize Telegram Stars gateway: {e}"),
                }
            } else {
                warn!("🏭️ Telegram Stars gateway disabled: missing bot token");
            }
        }
        if config.cryptomus.enabled {
            if config.cryptomus.is_complete() {
                match CryptomusGateway::new(config.cryptomus) {
                    Ok(gw) => {
                        info!("🏭️ Cryptomus gateway initialized");
                        gateways.insert(PaymentMethod::Cryptomus, Arc::new(gw));
                    },
                    Err(e) => error!("🏭️ Could not initialize Cryptomus gateway: {e}"),
                }
            } else {
                warn!("🏭️ Cryptomus gateway disabled: missing api key or merchant id");
            }
        }
        if config.manual.enabled {
            info!("🏭️ Manual gateway initialized");
            gateways.insert(PaymentMethod::Manual, Arc::new(ManualGateway::new(config.manual)));
        }
        if gateways.is_empty() {
            warn!("🏭️ No payment gateways are configured. Orders can be created but never paid.");
        }
        Self { gateways }
    }

    /// Builds a factory from preconstructed gateways, bypassing configuration. Used for custom
    /// providers and in tests.
    pub fn from_gateways(list: Vec<Arc<dyn PaymentGateway>>) -> Self {
        let gateways = list.into_iter().map(|gw| (gw.method(), gw)).collect();
        Self { gateways }
    }

    /// The gateway for `method`, if it is configured and currently available.
    pub fn get_gateway(&self, method: PaymentMethod) -> Option<Arc<dyn PaymentGateway>> {
        match self.gateways.get(&method) {
            Some(gw) if gw.is_available() => Some(Arc::clone(gw)),
            _ => {
                debug!("🏭️ Payment gateway {method} is not available");
                None
            },
        }
    }

    pub fn is_gateway_available(&self, method: PaymentMethod) -> bool {
        self.gateways.get(&method).map(|gw| gw.is_available()).unwrap_or(false)
    }

    pub fn available_gateways(&self) -> Vec<Arc<dyn PaymentGateway>> {
        self.gateways.values().filter(|gw| gw.is_available()).map(Arc::clone).collect()
    }

    /// Picks a gateway for `currency` by fixed priority, falling back to any available gateway.
    pub fn gateway_for_currency(&self, currency: Currency) -> Option<Arc<dyn PaymentGateway>> {
        for method in CURRENCY_PRIORITY {
            if let Some(gw) = self.get_gateway(method) {
                if gw.supports_currency(currency) {
                    return Some(gw);
                }
            }
        }
        self.available_gateways().into_iter().next()
    }

    pub fn supported_currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = Vec::new();
        for gw in self.available_gateways() {
            for &c in gw.supported_currencies() {
                if !currencies.contains(&c) {
                    currencies.push(c);
                }
            }
        }
        currencies
    }
}

#[cfg(test)]
mod test {
    use kiosk_common::Secret;

    use super::*;
    use crate::gateways::{CryptomusConfig, ManualConfig, TelegramStarsConfig};

    fn full_config() -> PaymentsConfig {
        PaymentsConfig {
            cryptomus: CryptomusConfig {
                enabled: true,
                api_key: Secret::new("key".to_string()),
                merchant_id: "m1".to_string(),
                ..Default::default()
            },
            telegram_stars: TelegramStarsConfig {
                enabled: true,
                bot_token: Secret::new("123:token".to_string()),
                ..Default::default()
            },
            manual: ManualConfig { enabled: true },
        }
    }

    #[test]
    fn only_complete_configurations_produce_gateways() {
        let factory = PaymentGatewayFactory::new(full_config());
        assert!(factory.is_gateway_available(PaymentMethod::Cryptomus));
        assert!(factory.is_gateway_available(PaymentMethod::TelegramStars));
        assert!(factory.is_gateway_available(PaymentMethod::Manual));

        let mut config = full_config();
        config.cryptomus.merchant_id.clear();
        config.telegram_stars.enabled = false;
        let factory = PaymentGatewayFactory::new(config);
        assert!(factory.get_gateway(PaymentMethod::Cryptomus).is_none());
        assert!(factory.get_gateway(PaymentMethod::TelegramStars).is_none());
        assert!(factory.get_gateway(PaymentMethod::Manual).is_some());
    }

    #[test]
    fn missing_gateways_are_a_checked_outcome() {
        let factory = PaymentGatewayFactory::new(PaymentsConfig::default());
        assert!(factory.get_gateway(PaymentMethod::Cryptomus).is_none());
        assert!(factory.available_gateways().is_empty());
        assert!(factory.gateway_for_currency(Currency::USD).is_none());
    }

    #[test]
    fn currency_selection_prefers_stars_then_crypto() {
        let factory = PaymentGatewayFactory::new(full_config());
        let gw = factory.gateway_for_currency(Currency::XTR).unwrap();
        assert_eq!(gw.method(), PaymentMethod::TelegramStars);

        let mut config = full_config();
        config.telegram_stars.enabled = false;
        let factory = PaymentGatewayFactory::new(config);
        let gw = factory.gateway_for_currency(Currency::USD).unwrap();
        assert_eq!(gw.method(), PaymentMethod::Cryptomus);
    }

    #[test]
    fn supported_currencies_union_all_gateways() {
        let factory = PaymentGatewayFactory::new(full_config());
        let currencies = factory.supported_currencies();
        assert!(currencies.contains(&Currency::XTR));
        assert!(currencies.contains(&Currency::USD));
    }
}
