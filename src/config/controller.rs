//! # Controller Configuration
//!
//! Reconciliation behaviour knobs.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_BROKER_REQUEST_TIMEOUT_SECS,
    DEFAULT_CONTROLLER_NAME, DEFAULT_RESYNC_INTERVAL_SECS,
};
use crate::error::ErrorKind;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Reporting component on events and field manager on writes
    pub controller_name: String,
    /// Also hand broker and materialization failures back to the dispatcher as errors,
    /// so they are retried with backoff instead of waiting for the next resync
    pub propagate_transient_failures: bool,
    /// Send `accepts_incomplete=true` so brokers may bind asynchronously
    pub accepts_incomplete: bool,
    pub broker_request_timeout_secs: u64,
    /// Requeue interval after a pass that returned without error
    pub resync_interval_secs: u64,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            propagate_transient_failures: false,
            accepts_incomplete: true,
            broker_request_timeout_secs: DEFAULT_BROKER_REQUEST_TIMEOUT_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            controller_name: env_var_or_default("CONTROLLER_NAME", defaults.controller_name),
            propagate_transient_failures: env_var_or_default(
                "PROPAGATE_TRANSIENT_FAILURES",
                defaults.propagate_transient_failures,
            ),
            accepts_incomplete: env_var_or_default(
                "BROKER_ACCEPTS_INCOMPLETE",
                defaults.accepts_incomplete,
            ),
            broker_request_timeout_secs: env_var_or_default(
                "BROKER_REQUEST_TIMEOUT_SECS",
                defaults.broker_request_timeout_secs,
            ),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                defaults.resync_interval_secs,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", defaults.backoff_min_secs),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", defaults.backoff_max_secs),
        }
    }

    /// Whether a reported failure is also returned to the dispatcher
    pub fn propagates(&self, kind: ErrorKind) -> bool {
        kind.is_retryable() || (self.propagate_transient_failures && kind.is_transient())
    }

    pub fn broker_request_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_request_timeout_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}
