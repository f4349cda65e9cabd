//! # Error Types
//!
//! Failure taxonomy for Binding reconciliation.
//!
//! - [`ErrorKind`] classifies a failure and decides its disposition.
//! - [`Failure`] carries the data needed to render a condition and an event.
//! - [`ReconcilerError`] is what a reconciliation pass hands back to the dispatcher.

use crate::crd::BindingOperation;
use crate::cluster::StoreError;
use thiserror::Error;

/// Classification of reconciliation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NonexistentInstance,
    NonexistentServiceClass,
    NonexistentBroker,
    NonbindableCombination,
    InstanceOperationInProgress,
    InstanceNotReady,
    NamespaceLookupFailed,
    ParameterDecodeFailed,
    BrokerClientUnavailable,
    BrokerRequestFailed,
    MaterializationFailed,
    ArtifactCleanupFailed,
}

impl ErrorKind {
    /// The only kind that always propagates to the dispatcher as "try again later"
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::InstanceOperationInProgress)
    }

    /// Kinds caused by an external system misbehaving rather than by the Binding's spec.
    /// These propagate only when `propagate_transient_failures` is enabled.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::BrokerRequestFailed
                | ErrorKind::BrokerClientUnavailable
                | ErrorKind::MaterializationFailed
        )
    }

    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NonexistentInstance => "nonexistent_instance",
            ErrorKind::NonexistentServiceClass => "nonexistent_service_class",
            ErrorKind::NonexistentBroker => "nonexistent_broker",
            ErrorKind::NonbindableCombination => "nonbindable_combination",
            ErrorKind::InstanceOperationInProgress => "instance_operation_in_progress",
            ErrorKind::InstanceNotReady => "instance_not_ready",
            ErrorKind::NamespaceLookupFailed => "namespace_lookup_failed",
            ErrorKind::ParameterDecodeFailed => "parameter_decode_failed",
            ErrorKind::BrokerClientUnavailable => "broker_client_unavailable",
            ErrorKind::BrokerRequestFailed => "broker_request_failed",
            ErrorKind::MaterializationFailed => "materialization_failed",
            ErrorKind::ArtifactCleanupFailed => "artifact_cleanup_failed",
        }
    }
}

/// A failed step of a reconciliation pass
///
/// Names are already namespace-qualified (`namespace/name`) where the object is namespaced.
/// Rendering into a reason and message lives in the status reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    NonexistentInstance {
        instance: String,
    },
    NonexistentServiceClass {
        service_class: String,
    },
    /// Plan missing from its ServiceClass; reported in the ServiceClass family
    NonexistentPlan {
        service_class: String,
        plan: String,
    },
    NonexistentBroker {
        broker: String,
    },
    NonbindableCombination {
        service_class: String,
        plan: String,
    },
    InstanceOperationInProgress {
        instance: String,
    },
    InstanceNotReady {
        instance: String,
    },
    NamespaceLookupFailed {
        namespace: String,
        detail: String,
    },
    ParameterDecodeFailed {
        detail: String,
    },
    BrokerClientUnavailable {
        broker: String,
        detail: String,
    },
    BrokerRequestFailed {
        operation: BindingOperation,
        instance: String,
        service_class: String,
        broker: String,
        detail: String,
    },
    MaterializationFailed {
        detail: String,
    },
    ArtifactCleanupFailed {
        detail: String,
    },
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Failure::NonexistentInstance { .. } => ErrorKind::NonexistentInstance,
            Failure::NonexistentServiceClass { .. } | Failure::NonexistentPlan { .. } => {
                ErrorKind::NonexistentServiceClass
            }
            Failure::NonexistentBroker { .. } => ErrorKind::NonexistentBroker,
            Failure::NonbindableCombination { .. } => ErrorKind::NonbindableCombination,
            Failure::InstanceOperationInProgress { .. } => ErrorKind::InstanceOperationInProgress,
            Failure::InstanceNotReady { .. } => ErrorKind::InstanceNotReady,
            Failure::NamespaceLookupFailed { .. } => ErrorKind::NamespaceLookupFailed,
            Failure::ParameterDecodeFailed { .. } => ErrorKind::ParameterDecodeFailed,
            Failure::BrokerClientUnavailable { .. } => ErrorKind::BrokerClientUnavailable,
            Failure::BrokerRequestFailed { .. } => ErrorKind::BrokerRequestFailed,
            Failure::MaterializationFailed { .. } => ErrorKind::MaterializationFailed,
            Failure::ArtifactCleanupFailed { .. } => ErrorKind::ArtifactCleanupFailed,
        }
    }
}

/// Error returned by a reconciliation pass
///
/// Returning an error tells the dispatcher to re-invoke reconciliation later.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// A reported failure that is also propagated for retry
    #[error("{message}")]
    Failed { kind: ErrorKind, message: String },

    /// The broker accepted an operation asynchronously
    #[error("{operation} of Binding \"{binding}\" is still in progress at the broker")]
    OperationPending {
        binding: String,
        operation: BindingOperation,
    },

    /// Status rewrite rejected (typically an optimistic-concurrency conflict)
    #[error("failed to update status of Binding \"{binding}\": {source}")]
    StatusUpdate {
        binding: String,
        #[source]
        source: StoreError,
    },

    /// Adding or removing the finalizer failed
    #[error("failed to update finalizers of Binding \"{binding}\": {source}")]
    Finalizer {
        binding: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcilerError {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Failed { kind, .. } => kind.as_str(),
            ReconcilerError::OperationPending { .. } => "operation_pending",
            ReconcilerError::StatusUpdate { .. } => "status_update",
            ReconcilerError::Finalizer { .. } => "finalizer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_instance_operation_in_progress_is_retryable() {
        let all = [
            ErrorKind::NonexistentInstance,
            ErrorKind::NonexistentServiceClass,
            ErrorKind::NonexistentBroker,
            ErrorKind::NonbindableCombination,
            ErrorKind::InstanceOperationInProgress,
            ErrorKind::InstanceNotReady,
            ErrorKind::NamespaceLookupFailed,
            ErrorKind::ParameterDecodeFailed,
            ErrorKind::BrokerClientUnavailable,
            ErrorKind::BrokerRequestFailed,
            ErrorKind::MaterializationFailed,
            ErrorKind::ArtifactCleanupFailed,
        ];
        let retryable: Vec<_> = all.iter().filter(|k| k.is_retryable()).collect();
        assert_eq!(retryable, vec![&ErrorKind::InstanceOperationInProgress]);
    }

    #[test]
    fn test_spec_errors_are_not_transient() {
        assert!(!ErrorKind::NonbindableCombination.is_transient());
        assert!(!ErrorKind::ParameterDecodeFailed.is_transient());
        assert!(!ErrorKind::NamespaceLookupFailed.is_transient());
        assert!(ErrorKind::BrokerRequestFailed.is_transient());
        assert!(ErrorKind::MaterializationFailed.is_transient());
    }

    #[test]
    fn test_missing_plan_reports_as_service_class_error() {
        let failure = Failure::NonexistentPlan {
            service_class: "mysql".to_string(),
            plan: "gold".to_string(),
        };
        assert_eq!(failure.kind(), ErrorKind::NonexistentServiceClass);
    }

    #[test]
    fn test_reconciler_error_message_is_the_failure_message() {
        let err = ReconcilerError::Failed {
            kind: ErrorKind::InstanceOperationInProgress,
            message: "has ongoing asynchronous operation".to_string(),
        };
        assert_eq!(err.to_string(), "has ongoing asynchronous operation");
        assert_eq!(err.reason(), "instance_operation_in_progress");
    }
}
