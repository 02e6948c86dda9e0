//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue delay after a finalizer or status write conflict (seconds)
pub const DEFAULT_FINALIZER_REQUEUE_SECS: u64 = 2;

/// Writes of a newly created external identity attempted after a status conflict
pub const IDENTITY_WRITE_ATTEMPTS: usize = 3;

/// First retry delay after a failed external or template step (seconds)
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 10;

/// Cap for the per-object Fibonacci backoff (seconds)
pub const DEFAULT_ERROR_REQUEUE_MAX_SECS: u64 = 300;

/// Default exponential backoff starting value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Reconciliations running at once per kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 4;

/// Namespace the controller runs in when `POD_NAMESPACE` is unset
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "eck-custom-resources-system";

/// Default Elasticsearch instance URL
pub const DEFAULT_ES_URL: &str = "https://elasticsearch-es-http:9200";

/// Default Kibana instance URL
pub const DEFAULT_KIBANA_URL: &str = "https://kibana-kb-http:5601";

/// Field manager for server-side applied Secrets
pub const FIELD_MANAGER: &str = "resource-controller";
