use kiosk_common::Secret;

pub const DEFAULT_CRYPTOMUS_API_URL: &str = "https://api.cryptomus.com/v1";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Static configuration for all gateways. Assembled from the environment by the server crate; the
/// factory decides at construction time which gateways are actually usable.
#[derive(Debug, Clone, Default)]
pub struct PaymentsConfig {
    pub cryptomus: CryptomusConfig,
    pub telegram_stars: TelegramStarsConfig,
    pub manual: ManualConfig,
}

#[derive(Debug, Clone)]
pub struct CryptomusConfig {
    pub enabled: bool,
    pub api_key: Secret<String>,
    pub merchant_id: String,
    pub base_url: String,
}

impl Default for CryptomusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: Secret::default(),
            merchant_id: String::new(),
            base_url: DEFAULT_CRYPTOMUS_API_URL.to_string(),
        }
    }
}

impl CryptomusConfig {
    /// Enabled with both credentials present.
    pub fn is_complete(&self) -> bool {
        self.enabled && !self.api_key.reveal().is_empty() && !self.merchant_id.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TelegramStarsConfig {
    pub enabled: bool,
    pub bot_token: Secret<String>,
    pub base_url: String,
}

impl Default for TelegramStarsConfig {
    fn default() -> Self {
        Self { enabled: false, bot_token: Secret::default(), base_url: DEFAULT_TELEGRAM_API_URL.to_string() }
    }
}

impl TelegramStarsConfig {
    pub fn is_complete(&self) -> bool {
        self.enabled && !self.bot_token.reveal().is_empty()
    }
}

/// Admin-driven payments with no upstream provider.
#[derive(Debug, Clone, Default)]
pub struct ManualConfig {
    pub enabled: bool,
}
