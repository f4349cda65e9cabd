//! # Finalizer Management
//!
//! Adds the Binding finalizer before the first bind and drives the deletion path:
//! Unbind, remove the Secret and pod preset, report, then release the finalizer.
//!
//! Any failure leaves the finalizer in place so the Binding cannot disappear while
//! broker-side state or credentials may still exist.

use super::status::{self, Report};
use super::{broker_ops, credentials, resolver, Reconciler};
use crate::cluster::StoreError;
use crate::constants::BINDING_FINALIZER;
use crate::controller::reconciler::broker_ops::UnbindOutcome;
use crate::crd::{Binding, BindingOperation};
use crate::error::{Failure, ReconcilerError};
use kube::ResourceExt;
use tracing::{debug, info};

/// Adds the finalizer if missing and returns the stored Binding
pub async fn ensure_finalizer(
    ctx: &Reconciler,
    binding: &Binding,
) -> Result<Binding, ReconcilerError> {
    if binding.has_finalizer() {
        return Ok(binding.clone());
    }

    let mut updated = binding.clone();
    updated
        .finalizers_mut()
        .push(BINDING_FINALIZER.to_string());

    let stored = ctx
        .store
        .update_binding(&updated)
        .await
        .map_err(|source| ReconcilerError::Finalizer {
            binding: binding.qualified_name(),
            source,
        })?;
    debug!(binding = %binding.qualified_name(), "Added finalizer");
    Ok(stored)
}

/// Runs the deletion path for a Binding carrying a deletion timestamp
pub async fn finalize(ctx: &Reconciler, binding: &Binding) -> Result<(), ReconcilerError> {
    if !binding.has_finalizer() {
        debug!(binding = %binding.qualified_name(), "No finalizer, nothing to clean up");
        ctx.reset_backoff(&binding.qualified_name());
        return Ok(());
    }

    info!(binding = %binding.qualified_name(), "Unbinding deleted Binding");

    let target = match resolver::resolve_references(ctx.cache.as_ref(), binding) {
        Ok(target) => target,
        Err(failure) => return fail(ctx, binding, failure).await,
    };

    if target.instance.operation_in_progress() {
        let failure = Failure::InstanceOperationInProgress {
            instance: target.qualified_instance_name(),
        };
        return fail(ctx, binding, failure).await;
    }

    match broker_ops::unbind(ctx, binding, &target).await {
        Ok(UnbindOutcome::Unbound) => {}
        Ok(UnbindOutcome::InProgress { operation }) => {
            status::report(ctx, binding, Report::UnbindInProgress { operation }).await?;
            return Err(ReconcilerError::OperationPending {
                binding: binding.qualified_name(),
                operation: BindingOperation::Unbind,
            });
        }
        Err(failure) => return fail(ctx, binding, failure).await,
    }

    if let Err(failure) = credentials::remove(ctx, binding).await {
        return fail(ctx, binding, failure).await;
    }

    status::report(ctx, binding, Report::Unbound).await?;
    remove_finalizer(ctx, binding).await?;
    ctx.reset_backoff(&binding.qualified_name());
    Ok(())
}

/// Reports a deletion-path failure and always hands it back for retry
async fn fail(ctx: &Reconciler, binding: &Binding, failure: Failure) -> Result<(), ReconcilerError> {
    let kind = failure.kind();
    let (_, message) = status::render_failure(binding, &failure);
    status::report(ctx, binding, Report::Failed(failure)).await?;
    Err(ReconcilerError::Failed { kind, message })
}

/// Re-reads the Binding and removes the finalizer from the stored copy
async fn remove_finalizer(ctx: &Reconciler, binding: &Binding) -> Result<(), ReconcilerError> {
    let namespace = binding.namespace().unwrap_or_default();
    let to_err = |source| ReconcilerError::Finalizer {
        binding: binding.qualified_name(),
        source,
    };

    let mut current = match ctx.store.get_binding(&namespace, &binding.name_any()).await {
        Ok(current) => current,
        Err(StoreError::NotFound) => return Ok(()),
        Err(e) => return Err(to_err(e)),
    };

    current.finalizers_mut().retain(|f| f != BINDING_FINALIZER);
    ctx.store.update_binding(&current).await.map_err(to_err)?;
    info!(binding = %binding.qualified_name(), "Removed finalizer");
    Ok(())
}
