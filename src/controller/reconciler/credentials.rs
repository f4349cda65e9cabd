//! # Credential Materializer
//!
//! Writes broker credentials into the Binding's Secret and creates the optional
//! pod preset; removes both on unbind.
//!
//! The Secret carries a controller owner reference to its Binding. An existing
//! Secret with the same name is adopted only when it already belongs to this
//! Binding, so a re-run after a partial failure converges instead of conflicting.

use super::Reconciler;
use crate::broker::Credentials;
use crate::cluster::{PodPreset, StoreError};
use crate::constants::BINDING_LABEL;
use crate::crd::{qualified_name, Binding};
use crate::error::Failure;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Converts a credential payload into Secret data
///
/// Strings are stored as their raw bytes; every other value as its JSON text.
pub fn transcribe(credentials: &Credentials) -> BTreeMap<String, ByteString> {
    credentials
        .iter()
        .map(|(key, value)| {
            let bytes = match value {
                Value::String(s) => s.as_bytes().to_vec(),
                other => other.to_string().into_bytes(),
            };
            (key.clone(), ByteString(bytes))
        })
        .collect()
}

fn desired_secret(binding: &Binding, credentials: &Credentials) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(binding.spec.secret_name.clone()),
            namespace: binding.namespace(),
            labels: Some(BTreeMap::from([(
                BINDING_LABEL.to_string(),
                binding.name_any(),
            )])),
            owner_references: binding.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(transcribe(credentials)),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

fn is_owned_by(secret: &Secret, binding: &Binding) -> bool {
    let Some(uid) = binding.uid() else {
        return false;
    };
    secret.owner_references().iter().any(|o| o.uid == uid)
}

/// Creates (or converges) the Secret, then the pod preset
///
/// Both must succeed before the Binding may be reported Ready.
pub async fn materialize(
    ctx: &Reconciler,
    binding: &Binding,
    credentials: &Credentials,
) -> Result<(), Failure> {
    let namespace = binding.namespace().unwrap_or_default();
    let secret_name = qualified_name(Some(&namespace), &binding.spec.secret_name);
    let desired = desired_secret(binding, credentials);

    match ctx.store.create_secret(&desired).await {
        Ok(()) => {
            info!(binding = %binding.qualified_name(), secret = %secret_name, "Created credentials secret");
            metrics::increment_secrets_materialized();
        }
        Err(StoreError::AlreadyExists) => adopt_secret(ctx, binding, desired, &secret_name).await?,
        Err(e) => {
            return Err(Failure::MaterializationFailed {
                detail: format!("failed to create Secret \"{secret_name}\": {e}"),
            })
        }
    }

    if let Some(template) = &binding.spec.pod_preset_template {
        let preset = PodPreset {
            namespace: namespace.clone(),
            name: template.name.clone(),
            match_labels: template.selector.match_labels.clone(),
            secret_name: binding.spec.secret_name.clone(),
            owner: binding.controller_owner_ref(&()),
        };
        match ctx.store.create_pod_preset(&preset).await {
            Ok(()) => {
                info!(binding = %binding.qualified_name(), pod_preset = %template.name, "Created pod preset");
            }
            Err(StoreError::AlreadyExists) => {
                debug!(binding = %binding.qualified_name(), pod_preset = %template.name, "Pod preset already exists");
            }
            Err(e) => {
                return Err(Failure::MaterializationFailed {
                    detail: format!(
                        "failed to create PodPreset \"{}\": {e}",
                        qualified_name(Some(&namespace), &template.name)
                    ),
                })
            }
        }
    }

    Ok(())
}

async fn adopt_secret(
    ctx: &Reconciler,
    binding: &Binding,
    desired: Secret,
    secret_name: &str,
) -> Result<(), Failure> {
    let namespace = binding.namespace().unwrap_or_default();
    let existing = ctx
        .store
        .get_secret(&namespace, &binding.spec.secret_name)
        .await
        .map_err(|e| Failure::MaterializationFailed {
            detail: format!("failed to read existing Secret \"{secret_name}\": {e}"),
        })?;

    if !is_owned_by(&existing, binding) {
        return Err(Failure::MaterializationFailed {
            detail: format!("Secret \"{secret_name}\" already exists and is not owned by this Binding"),
        });
    }

    if existing.data == desired.data {
        debug!(binding = %binding.qualified_name(), secret = %secret_name, "Credentials secret is up to date");
        return Ok(());
    }

    let replacement = Secret {
        data: desired.data,
        ..existing
    };
    ctx.store
        .replace_secret(&replacement)
        .await
        .map_err(|e| Failure::MaterializationFailed {
            detail: format!("failed to update Secret \"{secret_name}\": {e}"),
        })?;
    info!(binding = %binding.qualified_name(), secret = %secret_name, "Updated credentials secret");
    metrics::increment_secrets_materialized();
    Ok(())
}

/// Deletes the Secret and pod preset; objects already gone count as deleted
pub async fn remove(ctx: &Reconciler, binding: &Binding) -> Result<(), Failure> {
    let namespace = binding.namespace().unwrap_or_default();
    let secret_name = qualified_name(Some(&namespace), &binding.spec.secret_name);

    match ctx
        .store
        .delete_secret(&namespace, &binding.spec.secret_name)
        .await
    {
        Ok(()) => {
            info!(binding = %binding.qualified_name(), secret = %secret_name, "Deleted credentials secret");
            metrics::increment_secrets_deleted();
        }
        Err(StoreError::NotFound) => {
            debug!(binding = %binding.qualified_name(), secret = %secret_name, "Credentials secret already gone");
        }
        Err(e) => {
            return Err(Failure::ArtifactCleanupFailed {
                detail: format!("failed to delete Secret \"{secret_name}\": {e}"),
            })
        }
    }

    if let Some(template) = &binding.spec.pod_preset_template {
        match ctx.store.delete_pod_preset(&namespace, &template.name).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => {
                return Err(Failure::ArtifactCleanupFailed {
                    detail: format!(
                        "failed to delete PodPreset \"{}\": {e}",
                        qualified_name(Some(&namespace), &template.name)
                    ),
                })
            }
        }
    }

    Ok(())
}
