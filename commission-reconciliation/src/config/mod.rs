//! Configuration module for commission-reconciliation.

use crate::engine::balance::default_settled_tolerance;
use crate::engine::ids::DEFAULT_PREFIX;
use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreConfig,
    pub reconciliation: ReconciliationSettings,
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres(DatabaseConfig),
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Engine defaults applied to every batch.
#[derive(Debug, Clone)]
pub struct ReconciliationSettings {
    pub default_prefix: String,
    pub fuzzy_tolerance_pct: Decimal,
    pub settled_tolerance: Decimal,
    pub known_portfolio_total: Option<Decimal>,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            default_prefix: DEFAULT_PREFIX.to_string(),
            fuzzy_tolerance_pct: Decimal::from(5),
            settled_tolerance: default_settled_tolerance(),
            known_portfolio_total: None,
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let store = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreConfig::Memory,
            "postgres" => StoreConfig::Postgres(DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            }),
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown STORE_BACKEND '{}'",
                    other
                )))
            }
        };

        let known_portfolio_total =
            decimal_setting("KNOWN_PORTFOLIO_TOTAL", env::var("KNOWN_PORTFOLIO_TOTAL").ok())?;
        let fuzzy_tolerance_pct =
            decimal_setting("FUZZY_TOLERANCE_PCT", env::var("FUZZY_TOLERANCE_PCT").ok())?
                .map(|v| non_negative("FUZZY_TOLERANCE_PCT", v))
                .transpose()?
                .unwrap_or_else(|| Decimal::from(5));
        let settled_tolerance =
            decimal_setting("SETTLED_TOLERANCE", env::var("SETTLED_TOLERANCE").ok())?
                .map(|v| non_negative("SETTLED_TOLERANCE", v))
                .transpose()?
                .unwrap_or_else(default_settled_tolerance);

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "commission-reconciliation".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            store,
            reconciliation: ReconciliationSettings {
                default_prefix: env::var("RECON_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_PREFIX.to_string()),
                fuzzy_tolerance_pct,
                settled_tolerance,
                known_portfolio_total,
            },
        })
    }
}

/// Parse an optional decimal setting. Unset or blank means "use the default";
/// anything else must parse.
fn decimal_setting(name: &str, raw: Option<String>) -> Result<Option<Decimal>, AppError> {
    match raw {
        Some(s) if !s.trim().is_empty() => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", name, e))),
        _ => Ok(None),
    }
}

fn non_negative(name: &str, value: Decimal) -> Result<Decimal, AppError> {
    if value.is_sign_negative() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "Invalid {}: must not be negative",
            name
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_setting_parses_trimmed_values() {
        let value = decimal_setting("SETTLED_TOLERANCE", Some(" 0.05 ".to_string())).unwrap();
        assert_eq!(value, Some(Decimal::new(5, 2)));
    }

    #[test]
    fn decimal_setting_treats_unset_and_blank_as_default() {
        assert_eq!(decimal_setting("SETTLED_TOLERANCE", None).unwrap(), None);
        assert_eq!(decimal_setting("SETTLED_TOLERANCE", Some("  ".to_string())).unwrap(), None);
    }

    #[test]
    fn decimal_setting_rejects_garbage() {
        let err = decimal_setting("SETTLED_TOLERANCE", Some("one cent".to_string())).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("SETTLED_TOLERANCE"));

        let err = decimal_setting("FUZZY_TOLERANCE_PCT", Some("5%".to_string())).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        assert!(non_negative("SETTLED_TOLERANCE", Decimal::new(-1, 2)).is_err());
        assert_eq!(
            non_negative("SETTLED_TOLERANCE", Decimal::ZERO).unwrap(),
            Decimal::ZERO
        );
    }
}
