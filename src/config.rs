//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `PORT` - Listen port (default: 8083)
//! - `STORE_ACCESS_MODE` - `closed`, `partial` or `open` (default: partial)
//! - `NATS_URL` - Publish domain events to NATS when set
//! - `ORDER_NUMBER_PREFIX` - Order number prefix (default: WO)
//! - `STORE_TIMEOUT_MS` - Bound on store calls while placing an order (default: 5000)
//! - `FLAT_SHIPPING_COST` - Shipping charged on every order (default: 0)
//! - `DB_MAX_CONNECTIONS` - Pool size (default: 10)

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::access::StoreAccessMode;
use crate::domain::value_objects::Money;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid environment variable {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub access_mode: StoreAccessMode,
    pub nats_url: Option<String>,
    pub order_number_prefix: String,
    pub store_timeout: Duration,
    pub flat_shipping_cost: Money,
    pub db_max_connections: u32,
}

impl Config {
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let shipping: Decimal = parse_or(get("FLAT_SHIPPING_COST"), "FLAT_SHIPPING_COST", Decimal::ZERO)?;
        if shipping.is_sign_negative() && !shipping.is_zero() {
            return Err(ConfigError::Invalid { key: "FLAT_SHIPPING_COST", reason: "cannot be negative".into() });
        }
        let timeout_ms: u64 = parse_or(get("STORE_TIMEOUT_MS"), "STORE_TIMEOUT_MS", 5_000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid { key: "STORE_TIMEOUT_MS", reason: "must be positive".into() });
        }

        Ok(Self {
            database_url,
            port: parse_or(get("PORT"), "PORT", 8083)?,
            access_mode: parse_or(get("STORE_ACCESS_MODE"), "STORE_ACCESS_MODE", StoreAccessMode::Partial)?,
            nats_url: get("NATS_URL"),
            order_number_prefix: get("ORDER_NUMBER_PREFIX").unwrap_or_else(|| "WO".to_string()),
            store_timeout: Duration::from_millis(timeout_ms),
            flat_shipping_cost: Money::new(shipping),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10)?,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() }),
    }
}
