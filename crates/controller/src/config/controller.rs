//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::reconciler::EngineConfig;
use crate::external::{DefaultInstance, RecoveryStrategy};
use crate::template::NamespacePolicy;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::warn;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay after a finalizer or status conflict (seconds)
    pub finalizer_requeue_secs: u64,
    /// First retry delay after a failed attempt (seconds)
    pub error_requeue_secs: u64,
    /// Cap for the per-object Fibonacci backoff (seconds)
    pub error_requeue_max_secs: u64,
    /// Exponential backoff starting value for watch errors (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch errors (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Reconciliations running at once per kind
    pub max_concurrent_reconciliations: u16,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    pub server_startup_timeout_secs: u64,
    pub server_poll_interval_ms: u64,
    /// Namespace the controller runs in; default instance Secrets live here
    pub controller_namespace: String,
    pub default_elasticsearch: DefaultInstance,
    pub default_kibana: DefaultInstance,
    /// Kinds to run controllers for; `None` runs every kind
    pub enabled_kinds: Option<BTreeSet<String>>,
    /// Per-kind meaning of a template reference without a namespace
    pub reference_policy_overrides: BTreeMap<String, NamespacePolicy>,
    /// How API keys recover from a failed apply
    pub apikey_recovery: RecoveryStrategy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from `lookup`, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        use crate::constants::*;
        let env = EnvSource(&lookup);
        let controller_namespace = env.string("POD_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE);
        Self {
            finalizer_requeue_secs: env
                .parsed("FINALIZER_REQUEUE_SECS", DEFAULT_FINALIZER_REQUEUE_SECS),
            error_requeue_secs: env.parsed("ERROR_REQUEUE_SECS", DEFAULT_ERROR_REQUEUE_SECS),
            error_requeue_max_secs: env
                .parsed("ERROR_REQUEUE_MAX_SECS", DEFAULT_ERROR_REQUEUE_MAX_SECS),
            backoff_start_ms: env.parsed("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env.parsed("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env
                .parsed("WATCH_RESTART_DELAY_SECS", DEFAULT_WATCH_RESTART_DELAY_SECS),
            watch_restart_delay_after_end_secs: env.parsed(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            max_concurrent_reconciliations: env.parsed(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            metrics_port: env.parsed("METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: env.parsed(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: env
                .parsed("SERVER_POLL_INTERVAL_MS", DEFAULT_SERVER_POLL_INTERVAL_MS),
            default_elasticsearch: DefaultInstance {
                enabled: env.boolean("DEFAULT_ES_ENABLED", true),
                url: env.string("DEFAULT_ES_URL", DEFAULT_ES_URL),
                namespace: controller_namespace.clone(),
                credentials_secret: env.optional("DEFAULT_ES_CREDENTIALS_SECRET"),
                ca_secret: env.optional("DEFAULT_ES_CA_SECRET"),
            },
            default_kibana: DefaultInstance {
                enabled: env.boolean("DEFAULT_KIBANA_ENABLED", false),
                url: env.string("DEFAULT_KIBANA_URL", DEFAULT_KIBANA_URL),
                namespace: controller_namespace.clone(),
                credentials_secret: env.optional("DEFAULT_KIBANA_CREDENTIALS_SECRET"),
                ca_secret: env.optional("DEFAULT_KIBANA_CA_SECRET"),
            },
            controller_namespace,
            enabled_kinds: env.optional("ENABLED_KINDS").map(|v| parse_kind_list(&v)),
            reference_policy_overrides: env
                .optional("UNSCOPED_REFERENCE_POLICY")
                .map(|v| parse_policy_overrides(&v))
                .unwrap_or_default(),
            apikey_recovery: env.parsed("APIKEY_RECOVERY_STRATEGY", RecoveryStrategy::Recreate),
        }
    }

    /// Requeue timings for the reconciliation engine
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            finalizer_requeue: Duration::from_secs(self.finalizer_requeue_secs),
            error_requeue_secs: self.error_requeue_secs,
            error_requeue_max_secs: self.error_requeue_max_secs,
        }
    }

    /// Whether the controller for `kind` should run
    #[must_use]
    pub fn kind_enabled(&self, kind: &str) -> bool {
        self.enabled_kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(kind))
    }

    /// Namespace policy for `kind`, honouring overrides
    #[must_use]
    pub fn reference_policy(&self, kind: &str, default: NamespacePolicy) -> NamespacePolicy {
        self.reference_policy_overrides
            .get(kind)
            .copied()
            .unwrap_or(default)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Parse `Kind,Kind,...`; blanks are ignored
#[must_use]
pub fn parse_kind_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse `Kind=Policy,Kind=Policy`; malformed entries are skipped with a warning
#[must_use]
pub fn parse_policy_overrides(value: &str) -> BTreeMap<String, NamespacePolicy> {
    let mut overrides = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((kind, policy)) = entry.split_once('=') else {
            warn!("Ignoring reference policy override '{}': expected Kind=Policy", entry);
            continue;
        };
        match policy.trim().parse::<NamespacePolicy>() {
            Ok(policy) => {
                overrides.insert(kind.trim().to_string(), policy);
            }
            Err(e) => warn!("Ignoring reference policy override '{}': {}", entry, e),
        }
    }
    overrides
}

struct EnvSource<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> EnvSource<'_, F> {
    /// Read variable or return default value
    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Read variable as boolean or return default
    fn boolean(&self, key: &str, default: bool) -> bool {
        (self.0)(key)
            .map(|v| {
                let v_lower = v.trim().to_lowercase();
                v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
            })
            .unwrap_or(default)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Non-empty variable value
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ControllerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.finalizer_requeue_secs, 2);
        assert_eq!(config.error_requeue_secs, 10);
        assert_eq!(config.error_requeue_max_secs, 300);
        assert!(config.default_elasticsearch.enabled);
        assert!(!config.default_kibana.enabled);
        assert!(config.kind_enabled("IndexTemplate"));
        assert_eq!(config.engine_config(), EngineConfig::default());
        assert_eq!(config.apikey_recovery, RecoveryStrategy::Recreate);
    }

    #[test]
    fn test_default_instances_from_env() {
        let config = config_from(&[
            ("POD_NAMESPACE", "search"),
            ("DEFAULT_ES_URL", "https://es:9200"),
            ("DEFAULT_ES_CREDENTIALS_SECRET", "es-elastic-user"),
            ("DEFAULT_KIBANA_ENABLED", "yes"),
            ("DEFAULT_KIBANA_CA_SECRET", " "),
        ]);
        assert_eq!(config.default_elasticsearch.url, "https://es:9200");
        assert_eq!(config.default_elasticsearch.namespace, "search");
        assert_eq!(
            config.default_elasticsearch.credentials_secret.as_deref(),
            Some("es-elastic-user")
        );
        assert!(config.default_kibana.enabled);
        assert_eq!(config.default_kibana.ca_secret, None);
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("ERROR_REQUEUE_SECS", "soon"),
            ("METRICS_PORT", "9100"),
            ("APIKEY_RECOVERY_STRATEGY", "Repair"),
        ]);
        assert_eq!(config.error_requeue_secs, 10);
        assert_eq!(config.metrics_port, 9100);
        assert_eq!(config.apikey_recovery, RecoveryStrategy::Repair);
    }

    #[test]
    fn test_enabled_kinds() {
        let config = config_from(&[("ENABLED_KINDS", "IndexTemplate, ElasticsearchRole,,")]);
        assert!(config.kind_enabled("IndexTemplate"));
        assert!(config.kind_enabled("ElasticsearchRole"));
        assert!(!config.kind_enabled("Space"));
    }

    #[test]
    fn test_policy_overrides() {
        let config = config_from(&[(
            "UNSCOPED_REFERENCE_POLICY",
            "IndexTemplate=ClusterWide,Space=bogus,broken,DataView=OwnNamespace",
        )]);
        assert_eq!(config.reference_policy_overrides.len(), 2);
        assert_eq!(
            config.reference_policy("IndexTemplate", NamespacePolicy::OwnNamespace),
            NamespacePolicy::ClusterWide
        );
        assert_eq!(
            config.reference_policy("DataView", NamespacePolicy::ClusterWide),
            NamespacePolicy::OwnNamespace
        );
        assert_eq!(
            config.reference_policy("Space", NamespacePolicy::OwnNamespace),
            NamespacePolicy::OwnNamespace
        );
    }
}
