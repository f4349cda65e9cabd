//! # Error Policy
//!
//! Requeue decisions for failed reconciliations. Backoff is tracked per Binding
//! so one failing Binding never slows down the others.

use crate::constants;
use crate::controller::reconciler::{BackoffState, Reconciler};
use crate::crd::Binding;
use crate::error::ReconcilerError;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed Binding with Fibonacci backoff
pub fn error_policy(binding: Arc<Binding>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    let key = binding.qualified_name();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        binding = %key,
        reason = error.reason(),
    );
    let _error_guard = error_span.enter();

    match error {
        ReconcilerError::OperationPending { .. } => {
            info!("Broker operation still running: {}", error);
        }
        _ => error!("Reconciliation error for {}: {}", key, error),
    }
    metrics::increment_reconciliation_errors(error.reason());

    let (backoff_secs, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key.clone()).or_insert_with(|| {
                BackoffState::new(ctx.config.backoff_min_secs, ctx.config.backoff_max_secs)
            });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    info!(
        "🔄 Retrying {} in {}s (error count: {}, trigger source: error-backoff)",
        key, backoff_secs, error_count
    );
    metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerClientFactory;
    use crate::cluster::fake::{FakeCache, FakeRecorder, FakeStore};
    use crate::config::ControllerConfig;
    use crate::controller::reconciler::tests::fixtures::binding;
    use crate::crd::{Broker, BindingOperation};
    use crate::error::ErrorKind;
    use async_trait::async_trait;

    struct NoBrokers;

    #[async_trait]
    impl BrokerClientFactory for NoBrokers {
        async fn client_for(
            &self,
            _broker: &Broker,
        ) -> Result<Arc<dyn crate::broker::BrokerClient>, crate::broker::BrokerError> {
            Err(crate::broker::BrokerError::Configuration("unused".to_string()))
        }
    }

    fn reconciler() -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            Arc::new(FakeCache::default()),
            Arc::new(FakeStore::default()),
            Arc::new(NoBrokers),
            Arc::new(FakeRecorder::default()),
            ControllerConfig::default(),
        ))
    }

    fn failure() -> ReconcilerError {
        ReconcilerError::Failed {
            kind: ErrorKind::InstanceOperationInProgress,
            message: "busy".to_string(),
        }
    }

    #[test]
    fn test_backoff_grows_per_binding() {
        let ctx = reconciler();
        let b = Arc::new(binding());

        let actions: Vec<Action> = (0..4)
            .map(|_| error_policy(Arc::clone(&b), &failure(), Arc::clone(&ctx)))
            .collect();

        assert_eq!(
            actions,
            vec![
                Action::requeue(Duration::from_secs(5)),
                Action::requeue(Duration::from_secs(5)),
                Action::requeue(Duration::from_secs(10)),
                Action::requeue(Duration::from_secs(15)),
            ]
        );
    }

    #[test]
    fn test_bindings_back_off_independently() {
        let ctx = reconciler();
        let first = Arc::new(binding());
        let mut other = binding();
        other.metadata.name = Some("other-binding".to_string());
        let other = Arc::new(other);

        for _ in 0..3 {
            error_policy(Arc::clone(&first), &failure(), Arc::clone(&ctx));
        }
        let pending = ReconcilerError::OperationPending {
            binding: other.qualified_name(),
            operation: BindingOperation::Bind,
        };
        assert_eq!(
            error_policy(other, &pending, Arc::clone(&ctx)),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let ctx = reconciler();
        let b = Arc::new(binding());
        for _ in 0..3 {
            error_policy(Arc::clone(&b), &failure(), Arc::clone(&ctx));
        }

        ctx.reset_backoff(&b.qualified_name());

        assert_eq!(
            error_policy(b, &failure(), ctx),
            Action::requeue(Duration::from_secs(5))
        );
    }
}
