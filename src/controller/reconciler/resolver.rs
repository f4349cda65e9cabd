//! # Reference Resolver
//!
//! Resolves a Binding's Instance, ServiceClass, Plan and Broker from the cache.
//!
//! Lookups short-circuit on the first failure. The bind path additionally checks
//! bindability, then any in-flight Instance operation, then Instance readiness.

use crate::cluster::ObjectCache;
use crate::crd::{is_bindable, qualified_name, Binding, Broker, Instance, ServiceClass, ServicePlan};
use crate::error::Failure;
use kube::ResourceExt;
use std::sync::Arc;

/// Everything a broker call needs to know about the bind target
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub instance: Arc<Instance>,
    pub service_class: Arc<ServiceClass>,
    pub plan: ServicePlan,
    pub broker: Arc<Broker>,
}

impl ResolvedTarget {
    pub fn instance_id(&self) -> &str {
        &self.instance.spec.external_id
    }

    pub fn service_id(&self) -> &str {
        &self.service_class.spec.external_id
    }

    pub fn plan_id(&self) -> &str {
        &self.plan.external_id
    }

    pub fn qualified_instance_name(&self) -> String {
        qualified_name(self.instance.namespace().as_deref(), &self.instance.name_any())
    }

    pub fn service_class_name(&self) -> String {
        self.service_class.name_any()
    }

    pub fn broker_name(&self) -> String {
        self.broker.name_any()
    }
}

/// Looks up Instance, ServiceClass, Plan and Broker
///
/// Used on both paths; the deletion path needs no more than this to unbind.
pub fn resolve_references(
    cache: &dyn ObjectCache,
    binding: &Binding,
) -> Result<ResolvedTarget, Failure> {
    let namespace = binding.namespace().unwrap_or_default();

    let instance = cache
        .instance(&namespace, &binding.spec.instance_ref.name)
        .ok_or_else(|| Failure::NonexistentInstance {
            instance: binding.qualified_instance_name(),
        })?;

    let class_name = &instance.spec.service_class_name;
    let service_class =
        cache
            .service_class(class_name)
            .ok_or_else(|| Failure::NonexistentServiceClass {
                service_class: class_name.clone(),
            })?;

    let plan = service_class
        .plan(&instance.spec.plan_name)
        .cloned()
        .ok_or_else(|| Failure::NonexistentPlan {
            service_class: class_name.clone(),
            plan: instance.spec.plan_name.clone(),
        })?;

    let broker_name = &service_class.spec.broker_name;
    let broker = cache
        .broker(broker_name)
        .ok_or_else(|| Failure::NonexistentBroker {
            broker: broker_name.clone(),
        })?;

    Ok(ResolvedTarget {
        instance,
        service_class,
        plan,
        broker,
    })
}

/// Resolves references and checks the target accepts a new bind
pub fn resolve_bind_target(
    cache: &dyn ObjectCache,
    binding: &Binding,
) -> Result<ResolvedTarget, Failure> {
    let target = resolve_references(cache, binding)?;

    if !is_bindable(&target.service_class, &target.plan) {
        return Err(Failure::NonbindableCombination {
            service_class: target.service_class_name(),
            plan: target.plan.name.clone(),
        });
    }

    if target.instance.operation_in_progress() {
        return Err(Failure::InstanceOperationInProgress {
            instance: target.qualified_instance_name(),
        });
    }

    if !target.instance.is_ready() {
        return Err(Failure::InstanceNotReady {
            instance: target.qualified_instance_name(),
        });
    }

    Ok(target)
}
