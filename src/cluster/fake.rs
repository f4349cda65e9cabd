//! In-memory collaborators for tests.

use super::{EventRecorder, ObjectCache, ObjectStore, PodPreset, Severity, StoreError};
use crate::crd::{Binding, Broker, Instance, ServiceClass};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
pub(crate) struct FakeCache {
    instances: BTreeMap<Key, Arc<Instance>>,
    service_classes: BTreeMap<String, Arc<ServiceClass>>,
    brokers: BTreeMap<String, Arc<Broker>>,
}

impl FakeCache {
    pub(crate) fn with_instance(mut self, instance: Instance) -> Self {
        let k = key(&instance.namespace().unwrap_or_default(), &instance.name_any());
        self.instances.insert(k, Arc::new(instance));
        self
    }

    pub(crate) fn with_service_class(mut self, class: ServiceClass) -> Self {
        self.service_classes
            .insert(class.name_any(), Arc::new(class));
        self
    }

    pub(crate) fn with_broker(mut self, broker: Broker) -> Self {
        self.brokers.insert(broker.name_any(), Arc::new(broker));
        self
    }
}

impl ObjectCache for FakeCache {
    fn instance(&self, namespace: &str, name: &str) -> Option<Arc<Instance>> {
        self.instances.get(&key(namespace, name)).cloned()
    }

    fn service_class(&self, name: &str) -> Option<Arc<ServiceClass>> {
        self.service_classes.get(name).cloned()
    }

    fn broker(&self, name: &str) -> Option<Arc<Broker>> {
        self.brokers.get(name).cloned()
    }
}

/// Failures injected into the next matching store call
#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub(crate) namespace_uid: Option<StoreError>,
    pub(crate) create_secret: Option<StoreError>,
    pub(crate) delete_secret: Option<StoreError>,
    pub(crate) create_pod_preset: Option<StoreError>,
    pub(crate) update_binding_status: Option<StoreError>,
}

/// Object store keeping everything in maps, with resourceVersion checks on update
#[derive(Debug, Default)]
pub(crate) struct FakeStore {
    bindings: Mutex<BTreeMap<Key, Binding>>,
    namespaces: Mutex<BTreeMap<String, String>>,
    secrets: Mutex<BTreeMap<Key, Secret>>,
    pod_presets: Mutex<BTreeMap<Key, PodPreset>>,
    /// Every mutating call, in order, e.g. `create_secret shop/db-creds`
    writes: Mutex<Vec<String>>,
    pub(crate) faults: Mutex<Faults>,
}

impl FakeStore {
    pub(crate) fn insert_binding(&self, binding: Binding) {
        let k = key(&binding.namespace().unwrap_or_default(), &binding.name_any());
        lock(&self.bindings).insert(k, binding);
    }

    pub(crate) fn insert_namespace(&self, name: &str, uid: &str) {
        lock(&self.namespaces).insert(name.to_string(), uid.to_string());
    }

    pub(crate) fn insert_secret(&self, secret: Secret) {
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        lock(&self.secrets).insert(k, secret);
    }

    pub(crate) fn binding(&self, namespace: &str, name: &str) -> Option<Binding> {
        lock(&self.bindings).get(&key(namespace, name)).cloned()
    }

    pub(crate) fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        lock(&self.secrets).get(&key(namespace, name)).cloned()
    }

    pub(crate) fn pod_preset(&self, namespace: &str, name: &str) -> Option<PodPreset> {
        lock(&self.pod_presets).get(&key(namespace, name)).cloned()
    }

    pub(crate) fn writes(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }

    pub(crate) fn writes_of(&self, operation: &str) -> usize {
        lock(&self.writes)
            .iter()
            .filter(|w| w.split(' ').next() == Some(operation))
            .count()
    }

    fn log(&self, operation: &str, namespace: &str, name: &str) {
        lock(&self.writes).push(format!("{operation} {namespace}/{name}"));
    }

    fn take_fault(&self, select: impl FnOnce(&mut Faults) -> &mut Option<StoreError>) -> Result<(), StoreError> {
        match select(&mut lock(&self.faults)).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Checks the resourceVersion and stores the binding with the next version
    fn commit_binding(&self, binding: &Binding) -> Result<Binding, StoreError> {
        let k = key(&binding.namespace().unwrap_or_default(), &binding.name_any());
        let mut bindings = lock(&self.bindings);
        let current = bindings.get(&k).ok_or(StoreError::NotFound)?;
        if current.resource_version() != binding.resource_version() {
            return Err(StoreError::Conflict(format!(
                "the object has been modified; expected resourceVersion {:?}",
                current.resource_version()
            )));
        }
        let next: u64 = current
            .resource_version()
            .and_then(|rv| rv.parse().ok())
            .unwrap_or(0)
            + 1;
        let mut stored = binding.clone();
        stored.metadata.resource_version = Some(next.to_string());
        bindings.insert(k, stored.clone());
        Ok(stored)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get_binding(&self, namespace: &str, name: &str) -> Result<Binding, StoreError> {
        self.binding(namespace, name).ok_or(StoreError::NotFound)
    }

    async fn update_binding(&self, binding: &Binding) -> Result<Binding, StoreError> {
        self.log(
            "update_binding",
            &binding.namespace().unwrap_or_default(),
            &binding.name_any(),
        );
        let k = key(&binding.namespace().unwrap_or_default(), &binding.name_any());
        // Spec and metadata replace; the stored status is kept
        let status = lock(&self.bindings).get(&k).and_then(|b| b.status.clone());
        let mut replacement = binding.clone();
        replacement.status = status;
        self.commit_binding(&replacement)
    }

    async fn update_binding_status(&self, binding: &Binding) -> Result<Binding, StoreError> {
        self.log(
            "update_binding_status",
            &binding.namespace().unwrap_or_default(),
            &binding.name_any(),
        );
        self.take_fault(|f| &mut f.update_binding_status)?;
        let k = key(&binding.namespace().unwrap_or_default(), &binding.name_any());
        // Only the status sub-object is written
        let current = lock(&self.bindings).get(&k).cloned().ok_or(StoreError::NotFound)?;
        let mut replacement = current;
        replacement.metadata.resource_version = binding.resource_version();
        replacement.status = binding.status.clone();
        self.commit_binding(&replacement)
    }

    async fn namespace_uid(&self, namespace: &str) -> Result<String, StoreError> {
        self.take_fault(|f| &mut f.namespace_uid)?;
        lock(&self.namespaces)
            .get(namespace)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        self.secret(namespace, name).ok_or(StoreError::NotFound)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let namespace = secret.namespace().unwrap_or_default();
        self.log("create_secret", &namespace, &secret.name_any());
        self.take_fault(|f| &mut f.create_secret)?;
        let mut secrets = lock(&self.secrets);
        let k = key(&namespace, &secret.name_any());
        if secrets.contains_key(&k) {
            return Err(StoreError::AlreadyExists);
        }
        secrets.insert(k, secret.clone());
        Ok(())
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let namespace = secret.namespace().unwrap_or_default();
        self.log("replace_secret", &namespace, &secret.name_any());
        let mut secrets = lock(&self.secrets);
        let k = key(&namespace, &secret.name_any());
        if !secrets.contains_key(&k) {
            return Err(StoreError::NotFound);
        }
        secrets.insert(k, secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.log("delete_secret", namespace, name);
        self.take_fault(|f| &mut f.delete_secret)?;
        lock(&self.secrets)
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn create_pod_preset(&self, preset: &PodPreset) -> Result<(), StoreError> {
        self.log("create_pod_preset", &preset.namespace, &preset.name);
        self.take_fault(|f| &mut f.create_pod_preset)?;
        let mut presets = lock(&self.pod_presets);
        let k = key(&preset.namespace, &preset.name);
        if presets.contains_key(&k) {
            return Err(StoreError::AlreadyExists);
        }
        presets.insert(k, preset.clone());
        Ok(())
    }

    async fn delete_pod_preset(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.log("delete_pod_preset", namespace, name);
        lock(&self.pod_presets)
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedEvent {
    pub(crate) binding: String,
    pub(crate) severity: Severity,
    pub(crate) reason: String,
    pub(crate) message: String,
}

impl RecordedEvent {
    /// `<Severity> <Reason> <message>`
    pub(crate) fn line(&self) -> String {
        format!("{} {} {}", self.severity, self.reason, self.message)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl FakeRecorder {
    pub(crate) fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventRecorder for FakeRecorder {
    async fn record(&self, binding: &Binding, severity: Severity, reason: &str, message: &str) {
        lock(&self.events).push(RecordedEvent {
            binding: binding.qualified_name(),
            severity,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}
