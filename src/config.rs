use std::env;
use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;
use thiserror::Error;

use crate::application::commission_engine::MAX_MATURITY_DAYS;
use crate::application::SettlementPolicy;
use crate::domain::withdrawal::FeePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_pool_size: u32,
    pub commission_maturity_days: i64,
    pub withdrawal_fixed_fee: BigDecimal,
    pub withdrawal_fee_rate: BigDecimal,
    pub maturation_sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8080u16)?;
        let db_pool_size = parse_or(&lookup, "DB_POOL_SIZE", 10u32)?;
        let commission_maturity_days = parse_or(&lookup, "COMMISSION_MATURITY_DAYS", 30i64)?;
        let withdrawal_fixed_fee = parse_or(&lookup, "WITHDRAWAL_FIXED_FEE", BigDecimal::from(5))?;
        let withdrawal_fee_rate = parse_or(
            &lookup,
            "WITHDRAWAL_FEE_RATE",
            BigDecimal::from(2) / BigDecimal::from(100),
        )?;
        let sweep_secs = parse_or(&lookup, "MATURATION_SWEEP_INTERVAL_SECS", 3600u64)?;

        if !(0..=MAX_MATURITY_DAYS).contains(&commission_maturity_days) {
            return Err(invalid("COMMISSION_MATURITY_DAYS", commission_maturity_days));
        }
        if db_pool_size == 0 {
            return Err(invalid("DB_POOL_SIZE", db_pool_size));
        }
        if withdrawal_fixed_fee < BigDecimal::from(0) {
            return Err(invalid("WITHDRAWAL_FIXED_FEE", &withdrawal_fixed_fee));
        }
        if withdrawal_fee_rate < BigDecimal::from(0) || withdrawal_fee_rate >= BigDecimal::from(1) {
            return Err(invalid("WITHDRAWAL_FEE_RATE", &withdrawal_fee_rate));
        }
        if sweep_secs == 0 {
            return Err(invalid("MATURATION_SWEEP_INTERVAL_SECS", sweep_secs));
        }

        Ok(Self {
            database_url,
            host,
            port,
            db_pool_size,
            commission_maturity_days,
            withdrawal_fixed_fee,
            withdrawal_fee_rate,
            maturation_sweep_interval: Duration::from_secs(sweep_secs),
        })
    }

    pub fn settlement_policy(&self) -> SettlementPolicy {
        SettlementPolicy {
            maturity_days: self.commission_maturity_days,
            fee_policy: FeePolicy {
                fixed_fee: self.withdrawal_fixed_fee.clone(),
                fee_rate: self.withdrawal_fee_rate.clone(),
            },
        }
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn invalid(name: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/rx")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.commission_maturity_days, 30);
        assert_eq!(cfg.withdrawal_fixed_fee, "5.00".parse::<BigDecimal>().unwrap());
        assert_eq!(cfg.withdrawal_fee_rate, "0.02".parse::<BigDecimal>().unwrap());
        assert_eq!(cfg.maturation_sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn malformed_port_is_rejected() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.to_string(), "PORT has an invalid value 'eighty'");
    }

    #[test]
    fn fee_rate_must_be_a_fraction() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("WITHDRAWAL_FEE_RATE", "2")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "WITHDRAWAL_FEE_RATE", .. }));
    }

    #[test]
    fn maturity_days_must_stay_within_bounds() {
        for raw in ["-1", "3651", "1000000000000000"] {
            let err = config(&[("DATABASE_URL", "postgres://x"), ("COMMISSION_MATURITY_DAYS", raw)])
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "COMMISSION_MATURITY_DAYS", .. }));
        }
        let cfg = config(&[("DATABASE_URL", "postgres://x"), ("COMMISSION_MATURITY_DAYS", "3650")]).unwrap();
        assert_eq!(cfg.commission_maturity_days, 3650);
    }

    #[test]
    fn settlement_policy_carries_fee_settings() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://x"),
            ("COMMISSION_MATURITY_DAYS", "14"),
            ("WITHDRAWAL_FIXED_FEE", "3.50"),
        ])
        .unwrap();
        let policy = cfg.settlement_policy();
        assert_eq!(policy.maturity_days, 14);
        assert_eq!(policy.fee_policy.fixed_fee, "3.50".parse::<BigDecimal>().unwrap());
    }
}
