//! # Cluster Collaborators
//!
//! Interfaces to cluster state used by the reconciler.
//!
//! - [`ObjectCache`]: read-only, eventually consistent lookups (reflector stores in production)
//! - [`ObjectStore`]: authoritative reads and writes against the API server
//! - [`EventRecorder`]: fire-and-forget Kubernetes Events
//!
//! The reconciler only talks to these traits, so tests drive it with in-memory fakes.

mod client;

pub use self::client::{KubeEventRecorder, KubeObjectStore, ReflectorCache};

use crate::crd::{Binding, Broker, Instance, ServiceClass};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Read-only view of catalog and instance objects
///
/// Safe for concurrent reads from many reconciliations; never mutated by the reconciler.
pub trait ObjectCache: Send + Sync {
    fn instance(&self, namespace: &str, name: &str) -> Option<Arc<Instance>>;
    fn service_class(&self, name: &str) -> Option<Arc<ServiceClass>>;
    fn broker(&self, name: &str) -> Option<Arc<Broker>>;
}

/// Authoritative object store
///
/// Updates carry the resourceVersion of the object passed in, so a stale write
/// fails with [`StoreError::Conflict`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_binding(&self, namespace: &str, name: &str) -> Result<Binding, StoreError>;

    /// Full replace of metadata and spec (used for finalizers)
    async fn update_binding(&self, binding: &Binding) -> Result<Binding, StoreError>;

    /// Rewrite of the status sub-object
    async fn update_binding_status(&self, binding: &Binding) -> Result<Binding, StoreError>;

    /// UID of a namespace, used as the broker `app_guid`
    async fn namespace_uid(&self, namespace: &str) -> Result<String, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError>;
    async fn create_secret(&self, secret: &Secret) -> Result<(), StoreError>;
    async fn replace_secret(&self, secret: &Secret) -> Result<(), StoreError>;
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn create_pod_preset(&self, preset: &PodPreset) -> Result<(), StoreError>;
    async fn delete_pod_preset(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => f.write_str("Normal"),
            Severity::Warning => f.write_str("Warning"),
        }
    }
}

/// Append-only event sink
///
/// Implementations log failures and never return them.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, binding: &Binding, severity: Severity, reason: &str, message: &str);
}

/// Pod preset that injects a binding secret into matching pods
#[derive(Debug, Clone, PartialEq)]
pub struct PodPreset {
    pub namespace: String,
    pub name: String,
    pub match_labels: BTreeMap<String, String>,
    pub secret_name: String,
    pub owner: Option<OwnerReference>,
}

/// Object store failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Api(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound,
            kube::Error::Api(api_err) if api_err.code == 409 => {
                if api_err.reason == "AlreadyExists" {
                    StoreError::AlreadyExists
                } else {
                    StoreError::Conflict(api_err.message.clone())
                }
            }
            kube::Error::Api(api_err) => StoreError::Api(api_err.message.clone()),
            kube::Error::SerdeError(e) => StoreError::Serialization(e.to_string()),
            other => StoreError::Api(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
pub(crate) mod fake;
