//! Engine configuration.
//!
//! # Responsibility
//! - Hold the tunables of the mutation engine and its collaborators.
//! - Read overrides from `FOCUSFLOW_*` environment variables.
//!
//! # Invariants
//! - Unset variables keep their defaults; malformed values are errors, never
//!   silently ignored.
//! - Durations are positive.

use crate::engine::{ConcurrencyPolicy, MutationKind, PolicyTable, ReconcilePolicy};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_NOTIFICATION_TTL_MS: &str = "FOCUSFLOW_NOTIFICATION_TTL_MS";
pub const ENV_REMOTE_TIMEOUT_MS: &str = "FOCUSFLOW_REMOTE_TIMEOUT_MS";
pub const ENV_CONCURRENCY: &str = "FOCUSFLOW_CONCURRENCY";
pub const ENV_STATUS_RECONCILE: &str = "FOCUSFLOW_STATUS_RECONCILE";

const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(3);
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidDuration { key: &'static str, value: String },
    InvalidConcurrency(String),
    InvalidReconcilePolicy(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDuration { key, value } => {
                write!(f, "{key} must be a positive number of milliseconds, got `{value}`")
            }
            Self::InvalidConcurrency(value) => write!(
                f,
                "unsupported concurrency policy `{value}`; expected last_resolver_wins|latest_issued_wins"
            ),
            Self::InvalidReconcilePolicy(value) => write!(
                f,
                "unsupported reconcile policy `{value}`; expected refetch|inverse_patch"
            ),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a notification stays visible.
    pub notification_ttl: Duration,
    /// Budget for one remote call, applied by `TimeoutGateway`.
    pub remote_timeout: Duration,
    pub concurrency: ConcurrencyPolicy,
    pub policies: PolicyTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            concurrency: ConcurrencyPolicy::default(),
            policies: PolicyTable::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns per variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_NOTIFICATION_TTL_MS) {
            config.notification_ttl = parse_millis(ENV_NOTIFICATION_TTL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_REMOTE_TIMEOUT_MS) {
            config.remote_timeout = parse_millis(ENV_REMOTE_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_CONCURRENCY) {
            config.concurrency = ConcurrencyPolicy::parse(&value)
                .ok_or_else(|| ConfigError::InvalidConcurrency(value.clone()))?;
        }
        if let Some(value) = lookup(ENV_STATUS_RECONCILE) {
            let policy = ReconcilePolicy::parse(&value)
                .ok_or_else(|| ConfigError::InvalidReconcilePolicy(value.clone()))?;
            config.policies = config.policies.with(MutationKind::UpdateStatus, policy);
        }

        Ok(config)
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyPolicy) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_policy(mut self, kind: MutationKind, policy: ReconcilePolicy) -> Self {
        self.policies = self.policies.with(kind, policy);
        self
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
        _ => Err(ConfigError::InvalidDuration {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.notification_ttl, Duration::from_secs(3));
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert_eq!(config.concurrency, ConcurrencyPolicy::LastResolverWins);
        assert_eq!(
            config.policies.for_kind(MutationKind::UpdateStatus),
            ReconcilePolicy::Refetch
        );
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            (ENV_NOTIFICATION_TTL_MS, "1500"),
            (ENV_REMOTE_TIMEOUT_MS, " 250 "),
            (ENV_CONCURRENCY, "latest_issued_wins"),
            (ENV_STATUS_RECONCILE, "inverse_patch"),
        ]))
        .unwrap();

        assert_eq!(config.notification_ttl, Duration::from_millis(1500));
        assert_eq!(config.remote_timeout, Duration::from_millis(250));
        assert_eq!(config.concurrency, ConcurrencyPolicy::LatestIssuedWins);
        assert_eq!(
            config.policies.for_kind(MutationKind::UpdateStatus),
            ReconcilePolicy::InversePatch
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[(ENV_REMOTE_TIMEOUT_MS, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));

        let err = EngineConfig::from_lookup(lookup_from(&[(ENV_CONCURRENCY, "first_wins")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidConcurrency("first_wins".to_string()));
        assert!(err.to_string().contains("latest_issued_wins"));
    }
}
