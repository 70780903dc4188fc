use std::{env, time::Duration};

use kiosk_common::{helpers::parse_boolean_flag, Secret};
use kiosk_engine::gateways::{
    CryptomusConfig,
    ManualConfig,
    PaymentsConfig,
    TelegramStarsConfig,
    DEFAULT_CRYPTOMUS_API_URL,
    DEFAULT_TELEGRAM_API_URL,
};
use log::*;

const DEFAULT_KIOSK_HOST: &str = "127.0.0.1";
const DEFAULT_KIOSK_PORT: u16 = 8360;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_PAYMENT_WINDOW_MINUTES: i64 = 30;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The externally reachable base url of this server, e.g. "https://shop.example.com". Used to
    /// build the callback urls handed to payment providers.
    pub public_url: Option<String>,
    /// How often the expired-order sweep runs.
    pub sweep_interval: Duration,
    /// How often pending payments are reconciled against the providers.
    pub reconcile_interval: Duration,
    /// How long buyers have to pay before an order lapses.
    pub payment_window_minutes: i64,
    pub payments: PaymentsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_KIOSK_HOST.to_string(),
            port: DEFAULT_KIOSK_PORT,
            database_url: String::default(),
            public_url: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            payment_window_minutes: DEFAULT_PAYMENT_WINDOW_MINUTES,
            payments: PaymentsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("KIOSK_HOST").ok().unwrap_or_else(|| DEFAULT_KIOSK_HOST.into());
        let port = env::var("KIOSK_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for KIOSK_PORT. {e} Using the default, {DEFAULT_KIOSK_PORT}, \
                         instead."
                    );
                    DEFAULT_KIOSK_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_KIOSK_PORT);
        let database_url = env::var("KIOSK_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ KIOSK_DATABASE_URL is not set. Please set it to the URL for the kiosk database.");
            String::default()
        });
        let public_url = env::var("KIOSK_PUBLIC_URL").ok().map(|s| s.trim_end_matches('/').to_string());
        if public_url.is_none() {
            warn!(
                "🪛️ KIOSK_PUBLIC_URL is not set. Payment providers will not receive callback urls unless clients \
                 supply them explicitly."
            );
        }
        let sweep_interval = interval_from_env("KIOSK_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL);
        let reconcile_interval = interval_from_env("KIOSK_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL);
        let payment_window_minutes = env::var("KIOSK_PAYMENT_WINDOW_MINUTES")
            .ok()
            .map(|s| {
                s.parse::<i64>().ok().filter(|m| *m > 0).unwrap_or_else(|| {
                    error!(
                        "🪛️ {s} is not a valid number of minutes for KIOSK_PAYMENT_WINDOW_MINUTES. Using the \
                         default, {DEFAULT_PAYMENT_WINDOW_MINUTES}, instead."
                    );
                    DEFAULT_PAYMENT_WINDOW_MINUTES
                })
            })
            .unwrap_or(DEFAULT_PAYMENT_WINDOW_MINUTES);
        let payments = payments_from_env();
        Self {
            host,
            port,
            database_url,
            public_url,
            sweep_interval,
            reconcile_interval,
            payment_window_minutes,
            payments,
        }
    }

    /// The callback url for `provider` webhooks, if a public url is configured.
    pub fn webhook_url_for(&self, provider: &str) -> Option<String> {
        self.public_url.as_ref().map(|base| format!("{base}/webhook/{provider}"))
    }
}

fn interval_from_env(var: &str, default: Duration) -> Duration {
    env::var(var)
        .ok()
        .map(|s| {
            s.parse::<u64>().map(Duration::from_secs).unwrap_or_else(|e| {
                error!("🪛️ {s} is not a valid number of seconds for {var}. {e} Using the default instead.");
                default
            })
        })
        .unwrap_or(default)
}

fn payments_from_env() -> PaymentsConfig {
    let cryptomus = CryptomusConfig {
        enabled: parse_boolean_flag(env::var("KIOSK_CRYPTOMUS_ENABLED").ok(), false),
        api_key: Secret::new(env::var("KIOSK_CRYPTOMUS_API_KEY").ok().unwrap_or_default()),
        merchant_id: env::var("KIOSK_CRYPTOMUS_MERCHANT_ID").ok().unwrap_or_default(),
        base_url: env::var("KIOSK_CRYPTOMUS_API_URL").ok().unwrap_or_else(|| DEFAULT_CRYPTOMUS_API_URL.into()),
    };
    if cryptomus.enabled && !cryptomus.is_complete() {
        warn!(
            "🪛️ Cryptomus payments are enabled but KIOSK_CRYPTOMUS_API_KEY or KIOSK_CRYPTOMUS_MERCHANT_ID is \
             missing. The gateway will not be offered."
        );
    }
    let telegram_stars = TelegramStarsConfig {
        enabled: parse_boolean_flag(env::var("KIOSK_TELEGRAM_STARS_ENABLED").ok(), false),
        bot_token: Secret::new(env::var("KIOSK_TELEGRAM_BOT_TOKEN").ok().unwrap_or_default()),
        base_url: env::var("KIOSK_TELEGRAM_API_URL").ok().unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.into()),
    };
    if telegram_stars.enabled && !telegram_stars.is_complete() {
        warn!(
            "🪛️ Telegram Stars payments are enabled but KIOSK_TELEGRAM_BOT_TOKEN is missing. The gateway will not \
             be offered."
        );
    }
    let manual = ManualConfig { enabled: parse_boolean_flag(env::var("KIOSK_MANUAL_PAYMENTS_ENABLED").ok(), false) };
    PaymentsConfig { cryptomus, telegram_stars, manual }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn webhook_urls_are_built_from_the_public_url() {
        let mut config = ServerConfig::default();
        assert!(config.webhook_url_for("cryptomus").is_none());
        config.public_url = Some("https://shop.example.com".to_string());
        assert_eq!(config.webhook_url_for("cryptomus").as_deref(), Some("https://shop.example.com/webhook/cryptomus"));
    }
}
