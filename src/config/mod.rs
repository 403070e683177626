use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::PricingTable;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub zarinpal: ZarinpalConfig,
    #[serde(default)]
    pub ton: TonConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default = "PricingTable::defaults")]
    pub pricing: PricingTable,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL, used to build the gateway callback URL.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZarinpalConfig {
    pub merchant_id: Option<String>,
    #[serde(default = "ZarinpalConfig::default_api_base")]
    pub api_base: String,
    #[serde(default = "ZarinpalConfig::default_start_pay_base")]
    pub start_pay_base: String,
    #[serde(default)]
    pub enabled: bool,
}

impl ZarinpalConfig {
    fn default_api_base() -> String {
        "https://api.zarinpal.com/pg/v4/payment".to_string()
    }

    fn default_start_pay_base() -> String {
        "https://www.zarinpal.com/pg/StartPay".to_string()
    }
}

impl Default for ZarinpalConfig {
    fn default() -> Self {
        Self {
            merchant_id: None,
            api_base: Self::default_api_base(),
            start_pay_base: Self::default_start_pay_base(),
            enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TonConfig {
    pub wallet_address: Option<String>,
    /// Chain API used to confirm submitted transactions. Without it the
    /// adapter only enforces the hash-linkage check.
    pub api_base: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    pub interval_secs: u64,
    /// Pending payments older than this are failed with reason "timeout".
    pub staleness_hours: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            staleness_hours: 24,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://tally.db")?
            .set_default("database.max_connections", 10)?
            .set_default("sweeper.interval_secs", 3_600)?
            .set_default("sweeper.staleness_hours", 24)?
            .set_default("zarinpal.enabled", false)?
            .set_default("ton.enabled", false)?
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (with TALLY__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://tally.db".to_string(),
                max_connections: 10,
            },
            zarinpal: ZarinpalConfig::default(),
            ton: TonConfig::default(),
            sweeper: SweeperConfig::default(),
            pricing: PricingTable::defaults(),
        }
    }
}
