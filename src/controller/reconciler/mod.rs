//! # Binding Reconciler
//!
//! Drives one Binding toward its declared state.
//!
//! ## Flow
//!
//! 1. Deleting: unbind, remove artifacts, release the finalizer ([`finalizer`])
//! 2. Resolve Instance, ServiceClass, Plan and Broker ([`resolver`])
//! 3. Look up the namespace UID used as the broker `app_guid`
//! 4. Add the finalizer, then Bind ([`broker_ops`])
//! 5. Write the Secret and pod preset ([`credentials`])
//! 6. Report Ready=True ([`status`])
//!
//! Every pass ends in exactly one status write and one event. Failures are
//! reported as Ready=False; only failures the configuration marks as propagating
//! are returned to the dispatcher.

pub mod broker_ops;
pub mod credentials;
pub mod finalizer;
pub mod resolver;
pub mod status;


use crate::broker::BrokerClientFactory;
use crate::cluster::{EventRecorder, ObjectCache, ObjectStore};
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::crd::{Binding, BindingOperation};
use crate::error::{Failure, ReconcilerError};
use broker_ops::BindOutcome;
use kube::ResourceExt;
use status::Report;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Per-Binding error backoff, kept by the runtime error policy
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Reconciliation context shared by every pass
pub struct Reconciler {
    pub cache: Arc<dyn ObjectCache>,
    pub store: Arc<dyn ObjectStore>,
    pub brokers: Arc<dyn BrokerClientFactory>,
    pub recorder: Arc<dyn EventRecorder>,
    pub config: ControllerConfig,
    /// Keyed by `namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        cache: Arc<dyn ObjectCache>,
        store: Arc<dyn ObjectStore>,
        brokers: Arc<dyn BrokerClientFactory>,
        recorder: Arc<dyn EventRecorder>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            cache,
            store,
            brokers,
            recorder,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Forgets the error backoff of the Binding keyed `namespace/name`
    pub fn reset_backoff(&self, key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(key);
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }

    /// Reconciles one Binding
    ///
    /// `Ok(())` means the outcome was handled (possibly as a reported failure).
    /// An error asks the dispatcher to try again later.
    pub async fn reconcile(&self, binding: &Binding) -> Result<(), ReconcilerError> {
        if binding.is_deleting() {
            return finalizer::finalize(self, binding).await;
        }

        let target = match resolver::resolve_bind_target(self.cache.as_ref(), binding) {
            Ok(target) => target,
            Err(failure) => return self.fail(binding, failure).await,
        };

        let namespace = binding.namespace().unwrap_or_default();
        let namespace_uid = match self.store.namespace_uid(&namespace).await {
            Ok(uid) => uid,
            Err(e) => {
                let failure = Failure::NamespaceLookupFailed {
                    namespace,
                    detail: e.to_string(),
                };
                return self.fail(binding, failure).await;
            }
        };

        let binding = finalizer::ensure_finalizer(self, binding).await?;

        let credentials =
            match broker_ops::bind(self, &binding, &target, &namespace_uid).await {
                Ok(BindOutcome::Bound(credentials)) => credentials,
                Ok(BindOutcome::InProgress { operation }) => {
                    status::report(self, &binding, Report::BindInProgress { operation }).await?;
                    return Err(ReconcilerError::OperationPending {
                        binding: binding.qualified_name(),
                        operation: BindingOperation::Bind,
                    });
                }
                Err(failure) => return self.fail(&binding, failure).await,
            };

        if let Err(failure) = credentials::materialize(self, &binding, &credentials).await {
            return self.fail(&binding, failure).await;
        }

        status::report(self, &binding, Report::Bound).await?;
        info!(binding = %binding.qualified_name(), "✅ Binding is ready");
        Ok(())
    }

    /// Reports a failure and decides whether it propagates
    async fn fail(&self, binding: &Binding, failure: Failure) -> Result<(), ReconcilerError> {
        let kind = failure.kind();
        let (_, message) = status::render_failure(binding, &failure);
        status::report(self, binding, Report::Failed(failure)).await?;

        if self.config.propagates(kind) {
            Err(ReconcilerError::Failed { kind, message })
        } else {
            debug!(
                binding = %binding.qualified_name(),
                kind = kind.as_str(),
                "Failure reported, waiting for the next resync"
            );
            Ok(())
        }
    }
}
