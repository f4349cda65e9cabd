//! # Broker Operations
//!
//! Builds Bind and Unbind requests for a resolved target and classifies the
//! broker's answer.

use super::resolver::ResolvedTarget;
use super::Reconciler;
use crate::broker::{
    BindRequest, BindResource, BindResponse, BrokerClient, Credentials, UnbindRequest,
    UnbindResponse,
};
use crate::crd::{Binding, BindingOperation, BindingParameters};
use crate::error::Failure;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a Bind call that the broker did not reject
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    Bound(Credentials),
    InProgress { operation: Option<String> },
}

/// Result of an Unbind call that the broker did not reject
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnbindOutcome {
    /// No broker-side state remains (completed or already gone)
    Unbound,
    InProgress { operation: Option<String> },
}

/// Decodes the stored parameters into a key/value map
///
/// Absent or null parameters decode to an empty map; anything other than a JSON
/// object is rejected.
pub fn decode_parameters(
    parameters: Option<&BindingParameters>,
) -> Result<Map<String, Value>, String> {
    match parameters.map(|p| &p.0) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(format!(
            "parameters must be a JSON object, got {}",
            json_type_name(other)
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

async fn client_for(
    ctx: &Reconciler,
    target: &ResolvedTarget,
) -> Result<Arc<dyn BrokerClient>, Failure> {
    ctx.brokers
        .client_for(&target.broker)
        .await
        .map_err(|e| Failure::BrokerClientUnavailable {
            broker: target.broker_name(),
            detail: e.to_string(),
        })
}

fn request_failed(operation: BindingOperation, target: &ResolvedTarget, detail: String) -> Failure {
    Failure::BrokerRequestFailed {
        operation,
        instance: target.qualified_instance_name(),
        service_class: target.service_class_name(),
        broker: target.broker_name(),
        detail,
    }
}

/// Issues a Bind for the binding against its resolved target
pub async fn bind(
    ctx: &Reconciler,
    binding: &Binding,
    target: &ResolvedTarget,
    namespace_uid: &str,
) -> Result<BindOutcome, Failure> {
    let parameters = decode_parameters(binding.spec.parameters.as_ref())
        .map_err(|detail| Failure::ParameterDecodeFailed { detail })?;

    let client = client_for(ctx, target).await?;

    let request = BindRequest {
        binding_id: binding.spec.external_id.clone(),
        instance_id: target.instance_id().to_string(),
        service_id: target.service_id().to_string(),
        plan_id: target.plan_id().to_string(),
        app_guid: namespace_uid.to_string(),
        bind_resource: BindResource {
            app_guid: namespace_uid.to_string(),
        },
        parameters,
        accepts_incomplete: ctx.config.accepts_incomplete,
    };

    debug!(
        binding = %binding.qualified_name(),
        broker = %target.broker_name(),
        binding_id = %request.binding_id,
        instance_id = %request.instance_id,
        "Sending bind request"
    );

    match client.bind(&request).await {
        Ok(BindResponse::Bound { credentials }) => {
            info!(
                binding = %binding.qualified_name(),
                broker = %target.broker_name(),
                keys = credentials.len(),
                "Broker returned credentials"
            );
            Ok(BindOutcome::Bound(credentials))
        }
        Ok(BindResponse::Accepted { operation }) => {
            info!(
                binding = %binding.qualified_name(),
                broker = %target.broker_name(),
                operation = ?operation,
                "Broker accepted bind asynchronously"
            );
            Ok(BindOutcome::InProgress { operation })
        }
        Err(e) => Err(request_failed(BindingOperation::Bind, target, e.to_string())),
    }
}

/// Issues an Unbind; parameters are not resent
pub async fn unbind(
    ctx: &Reconciler,
    binding: &Binding,
    target: &ResolvedTarget,
) -> Result<UnbindOutcome, Failure> {
    let client = client_for(ctx, target).await?;

    let request = UnbindRequest {
        binding_id: binding.spec.external_id.clone(),
        instance_id: target.instance_id().to_string(),
        service_id: target.service_id().to_string(),
        plan_id: target.plan_id().to_string(),
        accepts_incomplete: ctx.config.accepts_incomplete,
    };

    match client.unbind(&request).await {
        Ok(UnbindResponse::Completed) => Ok(UnbindOutcome::Unbound),
        Ok(UnbindResponse::Gone) => {
            debug!(
                binding = %binding.qualified_name(),
                "Broker has no record of binding, treating as unbound"
            );
            Ok(UnbindOutcome::Unbound)
        }
        Ok(UnbindResponse::Accepted { operation }) => Ok(UnbindOutcome::InProgress { operation }),
        Err(e) => Err(request_failed(BindingOperation::Unbind, target, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_parameters_decode_to_empty_map() {
        assert_eq!(decode_parameters(None), Ok(Map::new()));
        assert_eq!(
            decode_parameters(Some(&BindingParameters(Value::Null))),
            Ok(Map::new())
        );
    }

    #[test]
    fn test_object_parameters_are_passed_through() {
        let params = BindingParameters(json!({"readOnly": true, "tags": ["a", "b"]}));
        let decoded = decode_parameters(Some(&params)).expect("object decodes");
        assert_eq!(decoded.get("readOnly"), Some(&json!(true)));
        assert_eq!(decoded.get("tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_non_object_parameters_are_rejected() {
        let err = decode_parameters(Some(&BindingParameters(json!(["a"]))))
            .expect_err("arrays are not parameters");
        assert_eq!(err, "parameters must be a JSON object, got an array");
    }
}
