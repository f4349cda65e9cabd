//! # Status Types
//!
//! Status sub-objects and the condition type shared by Binding and Instance.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a Binding
///
/// Owned exclusively by the controller; every write is a full replace carrying the
/// observed resourceVersion.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindingStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Broker operation accepted asynchronously and not yet finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<BindingOperation>,
    /// Operation key returned by the broker for an asynchronous operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_key: Option<String>,
    /// When the asynchronous operation was accepted (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_start_time: Option<String>,
}

/// Status of an Instance
///
/// Written by the instance controller; read-only here.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Name of the asynchronous operation in flight (e.g. "Provision", "Deprovision")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_start_time: Option<String>,
    /// Set when the operation named by `currentOperation` has finished (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_completion_time: Option<String>,
}

/// Broker operation a Binding can have in flight
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, JsonSchema)]
pub enum BindingOperation {
    Bind,
    Unbind,
}

impl BindingOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            BindingOperation::Bind => "bind",
            BindingOperation::Unbind => "unbind",
        }
    }
}

impl fmt::Display for BindingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingOperation::Bind => f.write_str("Bind"),
            BindingOperation::Unbind => f.write_str("Unbind"),
        }
    }
}

/// Status value of a condition
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (only "Ready" is written by this controller)
    pub r#type: String,
    pub status: ConditionStatus,
    /// Last time the status changed (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the last update
    #[serde(default)]
    pub reason: String,
    /// Human-readable message for the last update
    #[serde(default)]
    pub message: String,
}
