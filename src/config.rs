use crate::application::lending::RetryPolicy;
use crate::domain::{LendingPolicy, MAX_LOAN_PERIOD_DAYS, Money};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/library";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// サーバーの設定
///
/// 環境変数から読み込む。未設定の項目は既定値を使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub policy: LendingPolicy,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: DEFAULT_PORT,
            policy: LendingPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `lookup`で値を引いて設定を組み立てる
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let read = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let policy = LendingPolicy {
            loan_period_days: at_most(
                "LIBRARY_LOAN_PERIOD_DAYS",
                parse_positive(
                    "LIBRARY_LOAN_PERIOD_DAYS",
                    read("LIBRARY_LOAN_PERIOD_DAYS"),
                    defaults.policy.loan_period_days,
                )?,
                MAX_LOAN_PERIOD_DAYS,
            )?,
            renewal_limit: parse(
                "LIBRARY_RENEWAL_LIMIT",
                read("LIBRARY_RENEWAL_LIMIT"),
                defaults.policy.renewal_limit,
            )?,
            daily_fine: parse_money(
                "LIBRARY_DAILY_FINE",
                read("LIBRARY_DAILY_FINE"),
                defaults.policy.daily_fine,
            )?,
            renewal_window_days: parse(
                "LIBRARY_RENEWAL_WINDOW_DAYS",
                read("LIBRARY_RENEWAL_WINDOW_DAYS"),
                defaults.policy.renewal_window_days,
            )?,
            reservation_validity_days: parse(
                "LIBRARY_RESERVATION_VALIDITY_DAYS",
                read("LIBRARY_RESERVATION_VALIDITY_DAYS"),
                defaults.policy.reservation_validity_days,
            )?,
            concurrent_limit: parse_positive(
                "LIBRARY_CONCURRENT_LIMIT",
                read("LIBRARY_CONCURRENT_LIMIT"),
                defaults.policy.concurrent_limit,
            )?,
        };

        let retry = RetryPolicy {
            max_attempts: parse_positive(
                "LIBRARY_RETRY_ATTEMPTS",
                read("LIBRARY_RETRY_ATTEMPTS"),
                defaults.retry.max_attempts,
            )?,
            initial_backoff_ms: parse(
                "LIBRARY_RETRY_BACKOFF_MS",
                read("LIBRARY_RETRY_BACKOFF_MS"),
                defaults.retry.initial_backoff_ms,
            )?,
        };

        Ok(Self {
            database_url: read("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse("PORT", read("PORT"), defaults.port)?,
            policy,
            retry,
        })
    }
}

fn parse<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_positive<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let original = raw.clone();
    let parsed = parse(key, raw, default)?;
    if parsed <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: original.unwrap_or_default(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

fn at_most<T>(key: &'static str, value: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value > max {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: format!("must not exceed {}", max),
        });
    }
    Ok(value)
}

fn parse_money(key: &'static str, raw: Option<String>, default: Money) -> Result<Money, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    let amount = Decimal::from_str(value.trim()).map_err(|e| ConfigError::Invalid {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })?;
    Money::new(amount).map_err(|e| ConfigError::Invalid {
        key,
        value,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(from(&[]).unwrap(), Config::default());
    }

    #[test]
    fn test_reads_policy_overrides() {
        let config = from(&[
            ("LIBRARY_LOAN_PERIOD_DAYS", "21"),
            ("LIBRARY_DAILY_FINE", "0.50"),
            ("LIBRARY_CONCURRENT_LIMIT", "5"),
            ("PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.policy.loan_period_days, 21);
        assert_eq!(config.policy.daily_fine.amount(), dec!(0.50));
        assert_eq!(config.policy.concurrent_limit, 5);
        assert_eq!(config.policy.renewal_limit, 2);
    }

    #[test]
    fn test_rejects_unparsable_number() {
        let err = from(&[("LIBRARY_RENEWAL_LIMIT", "two")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LIBRARY_RENEWAL_LIMIT", .. }));
    }

    #[test]
    fn test_rejects_zero_loan_period() {
        let err = from(&[("LIBRARY_LOAN_PERIOD_DAYS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LIBRARY_LOAN_PERIOD_DAYS", .. }));
    }

    #[test]
    fn test_rejects_negative_fine() {
        let err = from(&[("LIBRARY_DAILY_FINE", "-1.00")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LIBRARY_DAILY_FINE", .. }));
    }

    #[test]
    fn test_rejects_loan_period_beyond_cap() {
        let err = from(&[("LIBRARY_LOAN_PERIOD_DAYS", "100000000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LIBRARY_LOAN_PERIOD_DAYS", .. }));

        let config = from(&[("LIBRARY_LOAN_PERIOD_DAYS", "3650")]).unwrap();
        assert_eq!(config.policy.loan_period_days, MAX_LOAN_PERIOD_DAYS);
    }

    #[test]
    fn test_accepts_zero_fine() {
        let config = from(&[("LIBRARY_DAILY_FINE", "0")]).unwrap();
        assert!(config.policy.daily_fine.is_zero());
    }

    #[test]
    fn test_rejects_sub_cent_fine() {
        let err = from(&[("LIBRARY_DAILY_FINE", "0.125")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LIBRARY_DAILY_FINE", .. }));
    }
}
