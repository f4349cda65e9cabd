//! # Live Cluster Implementations
//!
//! [`ReflectorCache`], [`KubeObjectStore`] and [`KubeEventRecorder`] back the
//! collaborator traits with a real API server.

use super::{EventRecorder, ObjectCache, ObjectStore, PodPreset, Severity, StoreError};
use crate::crd::{Binding, Broker, Instance, ServiceClass};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{
    ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams,
};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Status fields that must be sent as explicit nulls when cleared, since a merge
/// patch leaves omitted fields untouched
const CLEARABLE_STATUS_FIELDS: [&str; 3] =
    ["currentOperation", "operationKey", "operationStartTime"];

/// Object cache backed by reflector stores
#[derive(Clone)]
pub struct ReflectorCache {
    instances: Store<Instance>,
    service_classes: Store<ServiceClass>,
    brokers: Store<Broker>,
}

impl std::fmt::Debug for ReflectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectorCache")
            .field("instances", &self.instances.state().len())
            .field("service_classes", &self.service_classes.state().len())
            .field("brokers", &self.brokers.state().len())
            .finish()
    }
}

impl ReflectorCache {
    pub fn new(
        instances: Store<Instance>,
        service_classes: Store<ServiceClass>,
        brokers: Store<Broker>,
    ) -> Self {
        Self {
            instances,
            service_classes,
            brokers,
        }
    }

    /// Waits until every store has received its initial list
    pub async fn wait_until_ready(&self) -> anyhow::Result<()> {
        self.instances.wait_until_ready().await?;
        self.service_classes.wait_until_ready().await?;
        self.brokers.wait_until_ready().await?;
        Ok(())
    }
}

impl ObjectCache for ReflectorCache {
    fn instance(&self, namespace: &str, name: &str) -> Option<Arc<Instance>> {
        self.instances
            .get(&ObjectRef::new(name).within(namespace))
    }

    fn service_class(&self, name: &str) -> Option<Arc<ServiceClass>> {
        self.service_classes.get(&ObjectRef::new(name))
    }

    fn broker(&self, name: &str) -> Option<Arc<Broker>> {
        self.brokers.get(&ObjectRef::new(name))
    }
}

/// Object store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    field_manager: String,
    pod_presets: ApiResource,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    pub fn new(client: Client, field_manager: &str) -> Self {
        let gvk = GroupVersionKind::gvk("settings.k8s.io", "v1alpha1", "PodPreset");
        Self {
            client,
            field_manager: field_manager.to_string(),
            pod_presets: ApiResource::from_gvk_with_plural(&gvk, "podpresets"),
        }
    }

    fn bindings(&self, namespace: &str) -> Api<Binding> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn presets(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.pod_presets)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, StoreError> {
    obj.namespace()
        .ok_or_else(|| StoreError::Api(format!("{} has no namespace", obj.name_any())))
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_binding(&self, namespace: &str, name: &str) -> Result<Binding, StoreError> {
        Ok(self.bindings(namespace).get(name).await?)
    }

    async fn update_binding(&self, binding: &Binding) -> Result<Binding, StoreError> {
        let namespace = namespace_of(binding)?;
        let updated = self
            .bindings(&namespace)
            .replace(&binding.name_any(), &self.post_params(), binding)
            .await?;
        Ok(updated)
    }

    async fn update_binding_status(&self, binding: &Binding) -> Result<Binding, StoreError> {
        let namespace = namespace_of(binding)?;
        let mut status = serde_json::to_value(binding.status.clone().unwrap_or_default())?;
        if let Some(fields) = status.as_object_mut() {
            for key in CLEARABLE_STATUS_FIELDS {
                fields
                    .entry(key.to_string())
                    .or_insert(serde_json::Value::Null);
            }
        }

        // resourceVersion in the body makes the API server reject stale writes with 409
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": binding.resource_version() },
            "status": status,
        });

        let updated = self
            .bindings(&namespace)
            .patch_status(
                &binding.name_any(),
                &PatchParams::default(),
                &Patch::Merge(patch),
            )
            .await?;
        Ok(updated)
    }

    async fn namespace_uid(&self, namespace: &str) -> Result<String, StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = api.get(namespace).await?;
        ns.metadata
            .uid
            .ok_or_else(|| StoreError::Api(format!("namespace {namespace} has no uid")))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        Ok(self.secrets(namespace).get(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let namespace = namespace_of(secret)?;
        self.secrets(&namespace)
            .create(&self.post_params(), secret)
            .await?;
        Ok(())
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let namespace = namespace_of(secret)?;
        self.secrets(&namespace)
            .replace(&secret.name_any(), &self.post_params(), secret)
            .await?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn create_pod_preset(&self, preset: &PodPreset) -> Result<(), StoreError> {
        let mut obj = DynamicObject::new(&preset.name, &self.pod_presets)
            .within(&preset.namespace)
            .data(serde_json::json!({
                "spec": {
                    "selector": { "matchLabels": preset.match_labels },
                    "envFrom": [
                        { "secretRef": { "name": preset.secret_name } }
                    ],
                }
            }));
        if let Some(owner) = &preset.owner {
            obj.metadata.owner_references = Some(vec![owner.clone()]);
        }

        self.presets(&preset.namespace)
            .create(&self.post_params(), &obj)
            .await?;
        Ok(())
    }

    async fn delete_pod_preset(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.presets(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// Event recorder wrapping `kube::runtime::events::Recorder`
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    /// The controller name is reported as the event's reporting component
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, binding: &Binding, severity: Severity, reason: &str, message: &str) {
        let event = Event {
            type_: match severity {
                Severity::Normal => EventType::Normal,
                Severity::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        let reference = binding.object_ref(&());

        match self.recorder.publish(&event, &reference).await {
            Ok(()) => debug!(binding = %binding.qualified_name(), reason, "Recorded event"),
            Err(e) => warn!(
                binding = %binding.qualified_name(),
                reason,
                error = %e,
                "Failed to publish Kubernetes event"
            ),
        }
    }
}
