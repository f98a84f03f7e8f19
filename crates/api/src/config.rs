//! Application configuration loaded from environment variables.

use std::time::Duration;

use fulfillment::{DEFAULT_RESERVATION_TTL_DAYS, FulfillmentConfig, MAX_RESERVATION_TTL_DAYS};
use store::DEFAULT_STORE_TIMEOUT;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres connection string; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `STORE_TIMEOUT_MS`: deadline for a single store call (default: `10000`)
/// - `RESERVATION_TTL_DAYS`: reservation expiry offset, 1 to 3650 (default: `7`)
/// - `AUTO_DRAIN_ON_RECEIPT`: drain backorders after every receipt (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_timeout_ms: u64,
    pub reservation_ttl_days: i64,
    pub auto_drain_on_receipt: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(var("PORT")).unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse(var("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            store_timeout_ms: parse(var("STORE_TIMEOUT_MS")).unwrap_or(defaults.store_timeout_ms),
            reservation_ttl_days: parse(var("RESERVATION_TTL_DAYS"))
                .filter(|days: &i64| (1..=MAX_RESERVATION_TTL_DAYS).contains(days))
                .unwrap_or(defaults.reservation_ttl_days),
            auto_drain_on_receipt: lookup("AUTO_DRAIN_ON_RECEIPT")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.auto_drain_on_receipt),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Engine settings derived from this configuration.
    pub fn fulfillment(&self) -> FulfillmentConfig {
        FulfillmentConfig::default()
            .with_reservation_ttl(
                chrono::Duration::try_days(self.reservation_ttl_days)
                    .unwrap_or(chrono::Duration::MAX),
            )
            .with_auto_drain(self.auto_drain_on_receipt)
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT.as_millis() as u64,
            reservation_ttl_days: DEFAULT_RESERVATION_TTL_DAYS,
            auto_drain_on_receipt: false,
        }
    }
}
