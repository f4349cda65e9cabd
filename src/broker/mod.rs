//! # Broker Client
//!
//! Interface to an Open Service Broker.
//!
//! The reconciler depends on [`BrokerClient`] and [`BrokerClientFactory`] only;
//! [`OsbClient`] is the HTTP implementation and [`KubeBrokerClientFactory`] builds
//! one per Broker resource, resolving its auth secret.

mod factory;
mod osb;

pub use factory::KubeBrokerClientFactory;
pub use osb::{BrokerAuth, OsbClient};

use crate::crd::Broker;
use async_trait::async_trait;
#[cfg(test)]
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Credential payload returned by a successful bind
pub type Credentials = Map<String, Value>;

/// Bind request
///
/// Identifiers travel in the URL; the remaining fields form the request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindRequest {
    #[serde(skip)]
    pub binding_id: String,
    #[serde(skip)]
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub app_guid: String,
    pub bind_resource: BindResource,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(skip)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindResource {
    pub app_guid: String,
}

/// Unbind request; parameters are never resent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindRequest {
    pub binding_id: String,
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindResponse {
    /// Synchronous success
    Bound { credentials: Credentials },
    /// Broker is processing the bind asynchronously
    Accepted { operation: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnbindResponse {
    Completed,
    /// Broker has no record of the binding
    Gone,
    Accepted { operation: Option<String> },
}

/// Broker client failures
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("request to broker failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("broker returned status {status}: {}", http_detail(.error.as_deref(), .description.as_deref()))]
    Http {
        status: u16,
        error: Option<String>,
        description: Option<String>,
    },

    #[error("failed to decode broker response: {0}")]
    Decode(String),

    #[error("broker client misconfigured: {0}")]
    Configuration(String),
}

fn http_detail(error: Option<&str>, description: Option<&str>) -> String {
    match (error, description) {
        (Some(e), Some(d)) => format!("{e}: {d}"),
        (Some(s), None) | (None, Some(s)) => s.to_string(),
        (None, None) => "no error detail".to_string(),
    }
}

/// Open Service Broker operations used by bindings
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn bind(&self, request: &BindRequest) -> Result<BindResponse, BrokerError>;
    async fn unbind(&self, request: &UnbindRequest) -> Result<UnbindResponse, BrokerError>;
}

/// Builds a client for a Broker resource
#[async_trait]
pub trait BrokerClientFactory: Send + Sync {
    async fn client_for(&self, broker: &Broker) -> Result<Arc<dyn BrokerClient>, BrokerError>;
}
