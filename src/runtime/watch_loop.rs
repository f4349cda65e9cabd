//! # Watch Loop
//!
//! Runs the `kube_runtime` controller over Bindings. Instance changes requeue the
//! Bindings that reference them, so a Binding waiting on a provisioning Instance
//! is retried as soon as the Instance settles.

use crate::controller::reconciler::Reconciler;
use crate::controller::server::ServerState;
use crate::crd::{qualified_name, Binding, Instance};
use crate::error::ReconcilerError;
use crate::observability::metrics;
use crate::runtime::error_policy::error_policy;
use anyhow::Result;
use futures::StreamExt;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::runtime::controller::Error as ControllerError;
use kube::runtime::Controller;
use kube::{Api, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, Instrument};

/// Watcher timeout (seconds); below the client read timeout so idle watches are
/// closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Reconcile adapter handed to the controller
///
/// A handled pass requeues after the resync interval and clears the Binding's
/// error backoff.
#[allow(
    clippy::missing_errors_doc,
    reason = "Errors are handled by error_policy"
)]
pub async fn reconcile_binding(
    binding: Arc<Binding>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let key = binding.qualified_name();
    let span = tracing::info_span!(
        "controller.reconcile",
        binding = %key,
        instance = %binding.qualified_instance_name(),
        deleting = binding.is_deleting(),
    );

    async move {
        metrics::increment_reconciliations();
        let start = Instant::now();
        let result = ctx.reconcile(&binding).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        result?;

        ctx.reset_backoff(&key);
        metrics::increment_requeues_total("resync");
        Ok(Action::requeue(ctx.config.resync_interval()))
    }
    .instrument(span)
    .await
}

/// Bindings in `bindings` that reference `instance`
pub fn bindings_for_instance(
    bindings: &[Arc<Binding>],
    instance: &Instance,
) -> Vec<ObjectRef<Binding>> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = instance.name_any();
    bindings
        .iter()
        .filter(|b| {
            b.namespace().as_deref() == Some(namespace.as_str()) && b.spec.instance_ref.name == name
        })
        .map(|b| ObjectRef::from_obj(b.as_ref()))
        .collect()
}

/// Run the controller until a shutdown signal arrives
#[allow(
    clippy::missing_errors_doc,
    reason = "Returns once the controller stream ends"
)]
pub async fn run_watch_loop(
    bindings: Api<Binding>,
    instances: Api<Instance>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);
    let controller = Controller::new(bindings, config.clone());
    let store = controller.store();

    let ctx = Arc::clone(&reconciler);

    info!("🚀 Watching Bindings");
    debug!(ready = server_state.is_ready(), "Probe server state");

    controller
        .watches(instances, config, move |instance| {
            bindings_for_instance(&store.state(), &instance)
        })
        .shutdown_on_signal()
        .run(reconcile_binding, error_policy, reconciler)
        .for_each(|result| {
            let ctx = Arc::clone(&ctx);
            async move {
                match result {
                    Ok((binding, _action)) => {
                        debug!(binding = %binding.name, "Reconciliation completed");
                    }
                    Err(ControllerError::ObjectNotFound(gone)) => {
                        // A requeued Binding that vanished keeps no backoff
                        debug!(binding = %gone.name, "Binding no longer exists");
                        ctx.reset_backoff(&qualified_name(gone.namespace.as_deref(), &gone.name));
                    }
                    Err(e) => {
                        error!(error = %e, "Controller stream error");
                    }
                }
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}
