//! # Constants
//!
//! Shared names and defaults for the Service Binding Controller.

/// API group of the service catalog resources
pub const API_GROUP: &str = "servicecatalog.microscaler.io";

/// Finalizer placed on a Binding while broker-side state may exist
pub const BINDING_FINALIZER: &str = "servicecatalog.microscaler.io/binding";

/// Label placed on materialized secrets and pod presets naming the owning Binding
pub const BINDING_LABEL: &str = "servicecatalog.microscaler.io/binding";

/// Annotation patched by `sbctl reconcile` to force a reconciliation
pub const RECONCILE_ANNOTATION: &str = "servicecatalog.microscaler.io/reconcile";

/// Condition type maintained on Binding status
pub const CONDITION_READY: &str = "Ready";

/// Default controller name (event reporting component and field manager)
pub const DEFAULT_CONTROLLER_NAME: &str = "service-binding-controller";

/// Open Service Broker API version sent with every broker request
pub const OSB_API_VERSION: &str = "2.13";

/// Default broker request timeout in seconds
pub const DEFAULT_BROKER_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default requeue interval after a successful reconciliation, in seconds
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default minimum error backoff in seconds
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default maximum error backoff in seconds
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 600;

/// Requeue used when the backoff state cannot be read
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// How long to wait for the probe server to bind
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Probe server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
