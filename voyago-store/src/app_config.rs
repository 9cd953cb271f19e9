use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub urls: RedirectUrls,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty string selects the in-memory backend (local development).
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Empty string disables the rate limiter.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    /// Empty string selects the mock processor (local development).
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub secret: String,
    /// Where the processor sends the payer after approval / cancellation.
    pub return_url: String,
    pub cancel_url: String,
}

/// Browser-facing redirect targets for the capture and cancel callbacks.
#[derive(Debug, Deserialize, Clone)]
pub struct RedirectUrls {
    pub booking_success: String,
    pub booking_failed: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Platform cut on partner payouts, in basis points.
    #[serde(default = "default_commission_bps")]
    pub commission_bps: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_commission_bps() -> u32 {
    1_000
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_rate_limit() -> i64 {
    100
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Base configuration, always present.
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional.
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // Environment variables win, e.g. VOYAGO__SERVER__PORT=8080.
            .add_source(config::Environment::with_prefix("VOYAGO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
