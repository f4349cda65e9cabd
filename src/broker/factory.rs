//! # Broker Client Factory
//!
//! Builds an [`OsbClient`] for a Broker resource after validating it and reading
//! its auth secret.

use super::{BrokerAuth, BrokerClient, BrokerClientFactory, BrokerError, OsbClient};
use crate::cluster::{ObjectStore, StoreError};
use crate::crd::{validate_broker, Broker, SecretReference};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

const USERNAME_KEY: &str = "username";
const PASSWORD_KEY: &str = "password";
const TOKEN_KEY: &str = "token";

/// Factory producing OSB clients from Broker resources
pub struct KubeBrokerClientFactory {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl std::fmt::Debug for KubeBrokerClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeBrokerClientFactory")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KubeBrokerClientFactory {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn auth_for(&self, broker: &Broker) -> Result<Option<BrokerAuth>, BrokerError> {
        let Some(auth_info) = &broker.spec.auth_info else {
            return Ok(None);
        };

        if let Some(reference) = &auth_info.basic_auth_secret {
            let secret = self.read_secret(reference).await?;
            let username = secret_value(&secret, reference, USERNAME_KEY)?;
            let password = secret_value(&secret, reference, PASSWORD_KEY)?;
            return Ok(Some(BrokerAuth::Basic {
                username: username.to_string(),
                password,
            }));
        }

        if let Some(reference) = &auth_info.bearer_token_secret {
            let secret = self.read_secret(reference).await?;
            let token = secret_value(&secret, reference, TOKEN_KEY)?;
            return Ok(Some(BrokerAuth::Bearer { token }));
        }

        Ok(None)
    }

    async fn read_secret(&self, reference: &SecretReference) -> Result<Secret, BrokerError> {
        self.store
            .get_secret(&reference.namespace, &reference.name)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => BrokerError::Configuration(format!(
                    "auth secret {}/{} not found",
                    reference.namespace, reference.name
                )),
                other => BrokerError::Configuration(format!(
                    "failed to read auth secret {}/{}: {other}",
                    reference.namespace, reference.name
                )),
            })
    }
}

fn secret_value(
    secret: &Secret,
    reference: &SecretReference,
    key: &str,
) -> Result<Zeroizing<String>, BrokerError> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| {
            BrokerError::Configuration(format!(
                "auth secret {}/{} has no {key} key",
                reference.namespace, reference.name
            ))
        })?;
    let value = String::from_utf8(bytes.0.clone()).map_err(|e| {
        BrokerError::Configuration(format!(
            "auth secret {}/{} key {key} is not valid UTF-8: {e}",
            reference.namespace, reference.name
        ))
    })?;
    Ok(Zeroizing::new(value))
}

#[async_trait]
impl BrokerClientFactory for KubeBrokerClientFactory {
    async fn client_for(&self, broker: &Broker) -> Result<Arc<dyn BrokerClient>, BrokerError> {
        let errors = validate_broker(broker);
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BrokerError::Configuration(format!(
                "Broker {} is invalid: {joined}",
                broker.name_any()
            )));
        }

        let auth = self.auth_for(broker).await?;
        debug!(broker = %broker.name_any(), url = %broker.spec.url, "Built broker client");
        let client = OsbClient::new(&broker.spec.url, auth, self.timeout)?;
        Ok(Arc::new(client))
    }
}
