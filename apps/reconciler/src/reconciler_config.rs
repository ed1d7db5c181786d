use std::env;
use std::str::FromStr;

use pipeaudit_application::{
    DEFAULT_CONTROL_TOTAL_EPSILON, DEFAULT_PAYLOAD_WARN_BYTES, ReconciliationConfig,
    RecorderConfig, RetryTier,
};
use pipeaudit_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Backing store selected by `AUDIT_STORE`.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditStoreConfig {
    /// Postgres through sqlx.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    /// Process-local store; contents vanish on exit.
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    pub store: AuditStoreConfig,
    pub recorder: RecorderConfig,
    pub reconciliation: ReconciliationConfig,
    pub write_retry_tier: RetryTier,
}

impl ReconcilerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let store = match optional(&lookup, "AUDIT_STORE")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("postgres") => AuditStoreConfig::Postgres {
                database_url: optional(&lookup, "DATABASE_URL").ok_or_else(|| {
                    AppError::Configuration(
                        "DATABASE_URL is required when AUDIT_STORE=postgres".to_owned(),
                    )
                })?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            },
            Some("memory") => AuditStoreConfig::Memory,
            Some(other) => {
                return Err(AppError::Configuration(format!(
                    "invalid AUDIT_STORE value '{other}', expected postgres or memory"
                )));
            }
        };

        if let AuditStoreConfig::Postgres {
            max_connections: 0, ..
        } = store
        {
            return Err(AppError::Configuration(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        let recorder = RecorderConfig {
            payload_warn_bytes: parse_or(&lookup, "AUDIT_PAYLOAD_WARN_BYTES", DEFAULT_PAYLOAD_WARN_BYTES)?,
        };
        let reconciliation = ReconciliationConfig::new(parse_or(
            &lookup,
            "RECONCILIATION_CONTROL_TOTAL_EPSILON",
            DEFAULT_CONTROL_TOTAL_EPSILON,
        )?)?;
        let write_retry_tier = parse_or(&lookup, "AUDIT_WRITE_RETRY_TIER", RetryTier::Default)?;

        Ok(Self {
            store,
            recorder,
            reconciliation,
            write_retry_tier,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, name) {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Configuration(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pipeaudit_application::RetryTier;
    use pipeaudit_core::AppError;

    use super::{AuditStoreConfig, ReconcilerConfig};

    fn load(pairs: &[(&str, &str)]) -> Result<ReconcilerConfig, AppError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ReconcilerConfig::from_lookup(|name| values.get(name).cloned())
    }

    #[test]
    fn postgres_store_requires_database_url() {
        assert!(matches!(load(&[]), Err(AppError::Configuration(_))));

        let config = load(&[("DATABASE_URL", "postgres://localhost/audit")]);
        assert!(config.is_ok());
        let config = config.unwrap_or_else(|_| unreachable!());
        assert_eq!(
            config.store,
            AuditStoreConfig::Postgres {
                database_url: "postgres://localhost/audit".to_owned(),
                max_connections: 5,
            }
        );
        assert_eq!(config.recorder.payload_warn_bytes, 10 * 1024);
        assert!((config.reconciliation.control_total_epsilon() - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.write_retry_tier, RetryTier::Default);
    }

    #[test]
    fn memory_store_needs_no_database() {
        let config = load(&[
            ("AUDIT_STORE", "Memory"),
            ("AUDIT_WRITE_RETRY_TIER", "aggressive"),
            ("AUDIT_PAYLOAD_WARN_BYTES", "2048"),
        ]);
        let config = config.unwrap_or_else(|_| unreachable!());
        assert_eq!(config.store, AuditStoreConfig::Memory);
        assert_eq!(config.write_retry_tier, RetryTier::Aggressive);
        assert_eq!(config.recorder.payload_warn_bytes, 2048);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for pairs in [
            vec![("AUDIT_STORE", "sqlite")],
            vec![("AUDIT_STORE", "memory"), ("AUDIT_WRITE_RETRY_TIER", "eager")],
            vec![
                ("AUDIT_STORE", "memory"),
                ("RECONCILIATION_CONTROL_TOTAL_EPSILON", "-0.5"),
            ],
            vec![("AUDIT_STORE", "memory"), ("AUDIT_PAYLOAD_WARN_BYTES", "lots")],
            vec![
                ("DATABASE_URL", "postgres://localhost/audit"),
                ("DATABASE_MAX_CONNECTIONS", "0"),
            ],
        ] {
            assert!(matches!(load(&pairs), Err(AppError::Configuration(_))));
        }
    }
}
