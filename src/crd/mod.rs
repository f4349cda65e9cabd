//! # Custom Resource Definitions
//!
//! CRD types for the Service Binding Controller.
//!
//! - [`Binding`]: a consumer's request for credentials to a provisioned [`Instance`]
//! - [`Instance`]: a provisioned service (read-only here)
//! - [`ServiceClass`]: a catalog entry with its plans (read-only here)
//! - [`Broker`]: the remote service broker that owns a ServiceClass

mod broker;
mod status;

pub use broker::*;
pub use status::*;

use crate::constants::{BINDING_FINALIZER, CONDITION_READY};
use kube::{CustomResource, ResourceExt};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Binding Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: servicecatalog.microscaler.io/v1
/// kind: Binding
/// metadata:
///   name: orders-db
///   namespace: shop
/// spec:
///   instanceRef:
///     name: orders-mysql
///   secretName: orders-db-credentials
///   externalID: 9b6b8a40-3ad4-4c56-9a43-0b1b1fc6a7f3
///   parameters:
///     readOnly: true
///   podPresetTemplate:
///     name: orders-db-env
///     selector:
///       matchLabels:
///         app: orders
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Binding",
    group = "servicecatalog.microscaler.io",
    version = "v1",
    namespaced,
    status = "BindingStatus",
    shortname = "sb",
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.instanceRef.name"}, {"name":"Secret", "type":"string", "jsonPath":".spec.secretName"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BindingSpec {
    /// Instance to bind to, in the Binding's namespace
    pub instance_ref: LocalObjectReference,
    /// Secret that receives the broker credentials
    pub secret_name: String,
    /// Immutable correlation ID handed to the broker as the binding ID
    #[serde(rename = "externalID")]
    pub external_id: String,
    /// Free-form parameters passed through to the broker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BindingParameters>,
    /// Pod preset created alongside the secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_preset_template: Option<PodPresetTemplate>,
}

/// Reference to an object in the same namespace
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct LocalObjectReference {
    pub name: String,
}

/// Opaque broker parameters
///
/// Stored as-is; the schema is owned by the broker plan. Decoding into a key/value
/// map happens when a bind request is built.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct BindingParameters(pub serde_json::Value);

impl JsonSchema for BindingParameters {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("BindingParameters")
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        let schema_value = serde_json::json!({
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true,
            "description": "Parameters passed to the broker on bind. The schema is defined by the service plan."
        });
        Schema::try_from(schema_value).expect("Failed to create Schema for BindingParameters")
    }
}

/// Descriptor of the pod preset that injects the binding secret
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodPresetTemplate {
    pub name: String,
    pub selector: LabelSelector,
}

/// Label selector restricted to exact matches
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl Binding {
    /// `namespace/name`
    pub fn qualified_name(&self) -> String {
        qualified_name(self.namespace().as_deref(), &self.name_any())
    }

    /// `namespace/name` of the referenced Instance
    pub fn qualified_instance_name(&self) -> String {
        qualified_name(self.namespace().as_deref(), &self.spec.instance_ref.name)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == BINDING_FINALIZER)
    }

    /// Ready condition, if one has been written
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.r#type == CONDITION_READY))
    }
}

/// Instance Custom Resource Definition
///
/// Provisioned by the instance controller; a Binding only reads it.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Instance",
    group = "servicecatalog.microscaler.io",
    version = "v1",
    namespaced,
    status = "InstanceStatus",
    shortname = "si",
    printcolumn = r#"{"name":"Class", "type":"string", "jsonPath":".spec.serviceClassName"}, {"name":"Plan", "type":"string", "jsonPath":".spec.planName"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub service_class_name: String,
    pub plan_name: String,
    /// Correlation ID handed to the broker as the instance ID
    #[serde(rename = "externalID")]
    pub external_id: String,
}

impl Instance {
    /// An asynchronous operation is in flight when one is named and has no completion time
    pub fn operation_in_progress(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.current_operation.as_deref().is_some_and(|op| !op.is_empty())
                && s.operation_completion_time.is_none()
        })
    }

    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.r#type == CONDITION_READY && c.status == ConditionStatus::True)
        })
    }
}

/// ServiceClass Custom Resource Definition
///
/// Catalog entry published by a broker, cluster-scoped.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "ServiceClass",
    group = "servicecatalog.microscaler.io",
    version = "v1",
    shortname = "sc",
    printcolumn = r#"{"name":"Broker", "type":"string", "jsonPath":".spec.brokerName"}, {"name":"Bindable", "type":"boolean", "jsonPath":".spec.bindable"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceClassSpec {
    pub broker_name: String,
    /// Service ID assigned by the broker
    #[serde(rename = "externalID")]
    pub external_id: String,
    /// Class-level bindability, overridden by a plan that sets its own
    #[serde(default)]
    pub bindable: bool,
    #[serde(default)]
    pub plans: Vec<ServicePlan>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePlan {
    pub name: String,
    /// Plan ID assigned by the broker
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
}

impl ServiceClass {
    pub fn plan(&self, name: &str) -> Option<&ServicePlan> {
        self.spec.plans.iter().find(|p| p.name == name)
    }
}

/// Plan-level bindability wins over class-level when set
pub fn is_bindable(class: &ServiceClass, plan: &ServicePlan) -> bool {
    plan.bindable.unwrap_or(class.spec.bindable)
}

/// Formats `namespace/name`; cluster-scoped objects render as `/name`
pub fn qualified_name(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}", namespace.unwrap_or_default(), name)
}
