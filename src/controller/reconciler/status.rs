//! # Condition and Event Reporting
//!
//! Renders reconciliation outcomes into the Binding's Ready condition and a
//! matching Kubernetes Event.
//!
//! All reasons and messages live in this module. Names in messages are
//! namespace-qualified (`namespace/name`).

use super::Reconciler;
use crate::cluster::Severity;
use crate::constants::CONDITION_READY;
use crate::crd::{Binding, BindingOperation, Condition, ConditionStatus};
use crate::error::{Failure, ReconcilerError};
use crate::observability::metrics;
use tracing::{info, warn};

pub const REASON_NONEXISTENT_INSTANCE: &str = "ReferencesNonexistentInstance";
pub const REASON_NONEXISTENT_SERVICE_CLASS: &str = "ReferencesNonexistentServiceClass";
pub const REASON_NONEXISTENT_BROKER: &str = "ReferencesNonexistentBroker";
pub const REASON_NONBINDABLE_SERVICE_CLASS: &str = "ErrorNonbindableServiceClass";
pub const REASON_ASYNC_OPERATION_IN_PROGRESS: &str = "ErrorAsyncOperationInProgress";
pub const REASON_INSTANCE_NOT_READY: &str = "ErrorInstanceNotReady";
pub const REASON_NAMESPACE_LOOKUP_FAILED: &str = "ErrorFindingNamespaceForInstance";
pub const REASON_PARAMETERS: &str = "ErrorWithParameters";
pub const REASON_BROKER_AUTH: &str = "ErrorGettingAuthCredentials";
pub const REASON_BIND_CALL_FAILED: &str = "BindCallFailed";
pub const REASON_UNBIND_CALL_FAILED: &str = "UnbindCallFailed";
pub const REASON_INJECTING_BIND_RESULT: &str = "ErrorInjectingBindResult";
pub const REASON_DELETING_BIND_RESULT: &str = "ErrorDeletingBindResult";
pub const REASON_INJECTED_BIND_RESULT: &str = "InjectedBindResult";
pub const REASON_ASYNC_BIND_IN_PROGRESS: &str = "AsyncBindInProgress";
pub const REASON_ASYNC_UNBIND_IN_PROGRESS: &str = "AsyncUnbindInProgress";
pub const REASON_UNBOUND: &str = "UnboundSuccessfully";

pub const MESSAGE_INJECTED_BIND_RESULT: &str = "Injected bind result";
pub const MESSAGE_UNBOUND: &str = "This binding was deleted successfully";

/// Terminal or retryable outcome of a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Failed(Failure),
    Bound,
    BindInProgress { operation: Option<String> },
    UnbindInProgress { operation: Option<String> },
    Unbound,
}

/// Condition and event content for an outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub status: ConditionStatus,
    pub severity: Severity,
    pub reason: &'static str,
    pub message: String,
}

/// Reason and message for a failure
pub fn render_failure(binding: &Binding, failure: &Failure) -> (&'static str, String) {
    let b = binding.qualified_name();
    match failure {
        Failure::NonexistentInstance { instance } => (
            REASON_NONEXISTENT_INSTANCE,
            format!("Binding \"{b}\" references a non-existent Instance \"{instance}\""),
        ),
        Failure::NonexistentServiceClass { service_class } => (
            REASON_NONEXISTENT_SERVICE_CLASS,
            format!("Binding \"{b}\" references a non-existent ServiceClass \"{service_class}\""),
        ),
        Failure::NonexistentPlan {
            service_class,
            plan,
        } => (
            REASON_NONEXISTENT_SERVICE_CLASS,
            format!(
                "Binding \"{b}\" references a non-existent Plan \"{plan}\" of ServiceClass \"{service_class}\""
            ),
        ),
        Failure::NonexistentBroker { broker } => (
            REASON_NONEXISTENT_BROKER,
            format!("Binding \"{b}\" references a non-existent Broker \"{broker}\""),
        ),
        Failure::NonbindableCombination {
            service_class,
            plan,
        } => (
            REASON_NONBINDABLE_SERVICE_CLASS,
            format!(
                "Binding \"{b}\" references a non-bindable ServiceClass (\"{service_class}\") and Plan (\"{plan}\") combination"
            ),
        ),
        Failure::InstanceOperationInProgress { instance } => (
            REASON_ASYNC_OPERATION_IN_PROGRESS,
            format!(
                "Binding \"{b}\" trying to bind to Instance \"{instance}\" that has ongoing asynchronous operation"
            ),
        ),
        Failure::InstanceNotReady { instance } => (
            REASON_INSTANCE_NOT_READY,
            format!("Binding cannot begin because referenced instance \"{instance}\" is not ready"),
        ),
        Failure::NamespaceLookupFailed { namespace, detail } => (
            REASON_NAMESPACE_LOOKUP_FAILED,
            format!("Failed to get namespace \"{namespace}\" during binding: {detail}"),
        ),
        Failure::ParameterDecodeFailed { detail } => (
            REASON_PARAMETERS,
            format!("Failed to decode parameters of Binding \"{b}\": {detail}"),
        ),
        Failure::BrokerClientUnavailable { broker, detail } => (
            REASON_BROKER_AUTH,
            format!("Error getting broker auth credentials for Broker \"{broker}\": {detail}"),
        ),
        Failure::BrokerRequestFailed {
            operation,
            instance,
            service_class,
            broker,
            detail,
        } => match operation {
            BindingOperation::Bind => (
                REASON_BIND_CALL_FAILED,
                format!(
                    "Error creating Binding \"{b}\" for Instance \"{instance}\" of ServiceClass \"{service_class}\" at Broker \"{broker}\": {detail}"
                ),
            ),
            BindingOperation::Unbind => (
                REASON_UNBIND_CALL_FAILED,
                format!(
                    "Error unbinding Binding \"{b}\" for Instance \"{instance}\" of ServiceClass \"{service_class}\" at Broker \"{broker}\": {detail}"
                ),
            ),
        },
        Failure::MaterializationFailed { detail } => (
            REASON_INJECTING_BIND_RESULT,
            format!("Error injecting bind result for Binding \"{b}\": {detail}"),
        ),
        Failure::ArtifactCleanupFailed { detail } => (
            REASON_DELETING_BIND_RESULT,
            format!("Error deleting bind result for Binding \"{b}\": {detail}"),
        ),
    }
}

pub fn render(binding: &Binding, report: &Report) -> Rendered {
    match report {
        Report::Failed(failure) => {
            let (reason, message) = render_failure(binding, failure);
            Rendered {
                status: ConditionStatus::False,
                severity: Severity::Warning,
                reason,
                message,
            }
        }
        Report::Bound => Rendered {
            status: ConditionStatus::True,
            severity: Severity::Normal,
            reason: REASON_INJECTED_BIND_RESULT,
            message: MESSAGE_INJECTED_BIND_RESULT.to_string(),
        },
        Report::BindInProgress { .. } => Rendered {
            status: ConditionStatus::False,
            severity: Severity::Normal,
            reason: REASON_ASYNC_BIND_IN_PROGRESS,
            message: "The binding is being created asynchronously".to_string(),
        },
        Report::UnbindInProgress { .. } => Rendered {
            status: ConditionStatus::False,
            severity: Severity::Normal,
            reason: REASON_ASYNC_UNBIND_IN_PROGRESS,
            message: "The binding is being deleted asynchronously".to_string(),
        },
        Report::Unbound => Rendered {
            status: ConditionStatus::False,
            severity: Severity::Normal,
            reason: REASON_UNBOUND,
            message: MESSAGE_UNBOUND.to_string(),
        },
    }
}

/// Returns `conditions` with the Ready condition set
///
/// `lastTransitionTime` moves to `now` only when the status changes; reason and
/// message always take the new values. The input is left untouched.
pub fn set_ready_condition(
    conditions: &[Condition],
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: &str,
) -> Vec<Condition> {
    let mut updated = conditions.to_vec();
    match updated.iter_mut().find(|c| c.r#type == CONDITION_READY) {
        Some(existing) => {
            if existing.status != status {
                existing.status = status;
                existing.last_transition_time = Some(now.to_string());
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
        }
        None => updated.push(Condition {
            r#type: CONDITION_READY.to_string(),
            status,
            last_transition_time: Some(now.to_string()),
            reason: reason.to_string(),
            message: message.to_string(),
        }),
    }
    updated
}

/// Writes the outcome to the Binding's status, then records one event
///
/// Works on a copy; `binding` is never modified. The event is only recorded once
/// the status write succeeded, so condition and latest event agree.
pub async fn report(
    ctx: &Reconciler,
    binding: &Binding,
    outcome: Report,
) -> Result<(), ReconcilerError> {
    let rendered = render(binding, &outcome);
    let now = chrono::Utc::now().to_rfc3339();

    let mut updated = binding.clone();
    let status = updated.status.get_or_insert_with(Default::default);
    status.conditions = set_ready_condition(
        &status.conditions,
        rendered.status,
        rendered.reason,
        &rendered.message,
        &now,
    );

    match &outcome {
        Report::BindInProgress { operation } => {
            mark_operation(status, BindingOperation::Bind, operation.clone(), &now);
        }
        Report::UnbindInProgress { operation } => {
            mark_operation(status, BindingOperation::Unbind, operation.clone(), &now);
        }
        Report::Failed(_) | Report::Bound | Report::Unbound => {
            status.current_operation = None;
            status.operation_key = None;
            status.operation_start_time = None;
        }
    }

    ctx.store
        .update_binding_status(&updated)
        .await
        .map_err(|source| ReconcilerError::StatusUpdate {
            binding: binding.qualified_name(),
            source,
        })?;

    if let Report::Failed(failure) = &outcome {
        metrics::increment_failures_reported(failure.kind().as_str());
        warn!(
            binding = %binding.qualified_name(),
            reason = rendered.reason,
            "{}",
            rendered.message
        );
    } else {
        info!(
            binding = %binding.qualified_name(),
            reason = rendered.reason,
            "{}",
            rendered.message
        );
    }

    ctx.recorder
        .record(binding, rendered.severity, rendered.reason, &rendered.message)
        .await;
    Ok(())
}

/// Records an in-flight broker operation, keeping the start time of one already recorded
fn mark_operation(
    status: &mut crate::crd::BindingStatus,
    operation: BindingOperation,
    key: Option<String>,
    now: &str,
) {
    if status.current_operation != Some(operation) {
        status.operation_start_time = Some(now.to_string());
    }
    status.current_operation = Some(operation);
    status.operation_key = key;
}

#[cfg(test)]
mod tests {
    use super::*;

    const EARLIER: &str = "2024-01-01T00:00:00+00:00";
    const NOW: &str = "2024-06-01T12:00:00+00:00";

    fn ready(status: ConditionStatus) -> Condition {
        Condition {
            r#type: CONDITION_READY.to_string(),
            status,
            last_transition_time: Some(EARLIER.to_string()),
            reason: "reason".to_string(),
            message: "message".to_string(),
        }
    }

    #[test]
    fn test_first_condition_gets_current_time() {
        let updated = set_ready_condition(&[], ConditionStatus::False, "R", "M", NOW);
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].last_transition_time.as_deref(), Some(NOW));
        assert_eq!(updated[0].reason, "R");
    }

    #[test]
    fn test_transition_time_changes_only_with_status() {
        let statuses = [
            ConditionStatus::True,
            ConditionStatus::False,
            ConditionStatus::Unknown,
        ];
        for old in statuses {
            for new in statuses {
                let input = vec![ready(old)];
                let updated = set_ready_condition(&input, new, "NewReason", "new message", NOW);

                let expected_time = if old == new { EARLIER } else { NOW };
                assert_eq!(
                    updated[0].last_transition_time.as_deref(),
                    Some(expected_time),
                    "{old:?} -> {new:?}"
                );
                assert_eq!(updated[0].status, new);
                assert_eq!(updated[0].reason, "NewReason");
                assert_eq!(updated[0].message, "new message");
                // input untouched
                assert_eq!(input[0], ready(old));
            }
        }
    }

    #[test]
    fn test_other_condition_types_are_preserved() {
        let other = Condition {
            r#type: "Synced".to_string(),
            ..ready(ConditionStatus::True)
        };
        let updated = set_ready_condition(&[other.clone()], ConditionStatus::True, "R", "M", NOW);
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0], other);
    }
}
