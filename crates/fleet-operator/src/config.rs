//! Environment configuration for the operator
//!
//! Reads go through [`EnvSource`] so parsing can be tested without touching
//! process-wide environment variables.

use fleet_clientconfig::DEFAULT_CONCURRENCY;
use fleet_common::{Error, WatchScope, WATCH_NAMESPACE_ENV};

/// Number of ClientConfigs reconciled at once
pub const RECONCILE_CONCURRENCY_ENV: &str = "FLEET_RECONCILE_CONCURRENCY";

/// OTLP collector endpoint
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Source of environment variables
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Value of `name`, if set
    fn var(&self, name: &str) -> Option<String>;
}

/// [`EnvSource`] backed by the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Operator settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespaces ClientConfigs are read from
    pub scope: WatchScope,
    /// Reconciles running at once
    pub concurrency: usize,
    /// OTLP endpoint, when exporting
    pub otlp_endpoint: Option<String>,
}

impl OperatorConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::from_source(&OsEnv)
    }

    /// Read settings from `env`
    pub fn from_source(env: &dyn EnvSource) -> Result<Self, Error> {
        let scope = env
            .var(WATCH_NAMESPACE_ENV)
            .map(|v| WatchScope::from_watch_namespace(&v))
            .unwrap_or_default();

        let concurrency = match env.var(RECONCILE_CONCURRENCY_ENV) {
            None => DEFAULT_CONCURRENCY,
            Some(raw) => {
                let parsed = raw.trim().parse::<usize>().map_err(|e| {
                    Error::validation_for(
                        RECONCILE_CONCURRENCY_ENV,
                        format!("'{raw}' is not a positive integer: {e}"),
                    )
                })?;
                if parsed == 0 {
                    return Err(Error::validation_for(
                        RECONCILE_CONCURRENCY_ENV,
                        "must be greater than zero",
                    ));
                }
                parsed
            }
        };

        let otlp_endpoint = env
            .var(OTLP_ENDPOINT_ENV)
            .filter(|e| !e.trim().is_empty());

        Ok(Self {
            scope,
            concurrency,
            otlp_endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(vars: &'static [(&'static str, &'static str)]) -> MockEnvSource {
        let mut env = MockEnvSource::new();
        env.expect_var().returning(move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        });
        env
    }

    #[test]
    fn defaults_when_unset() {
        let config = OperatorConfig::from_source(&env_with(&[])).unwrap();
        assert_eq!(config.scope, WatchScope::All);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.otlp_endpoint, None);
    }

    #[test]
    fn parses_every_setting() {
        let env = env_with(&[
            ("WATCH_NAMESPACE", "fleet, edge"),
            ("FLEET_RECONCILE_CONCURRENCY", "16"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel:4317"),
        ]);
        let config = OperatorConfig::from_source(&env).unwrap();
        assert_eq!(
            config.scope,
            WatchScope::Namespaces(vec!["fleet".to_string(), "edge".to_string()])
        );
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://otel:4317"));
    }

    #[test]
    fn blank_watch_namespace_means_all() {
        let config = OperatorConfig::from_source(&env_with(&[("WATCH_NAMESPACE", " , ")])).unwrap();
        assert!(config.scope.is_all());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = OperatorConfig::from_source(&env_with(&[("FLEET_RECONCILE_CONCURRENCY", "0")]))
            .unwrap_err();
        assert_eq!(err.object(), Some(RECONCILE_CONCURRENCY_ENV));
    }

    #[test]
    fn garbage_concurrency_is_rejected() {
        let err = OperatorConfig::from_source(&env_with(&[("FLEET_RECONCILE_CONCURRENCY", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn blank_otlp_endpoint_is_ignored() {
        let config =
            OperatorConfig::from_source(&env_with(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "  ")])).unwrap();
        assert_eq!(config.otlp_endpoint, None);
    }
}
