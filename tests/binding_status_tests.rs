//! # Binding Status and Credential Tests
//!
//! Public pure functions: Ready condition transitions, outcome rendering,
//! credential transcription and Broker validation.

use k8s_openapi::ByteString;
use serde_json::{json, Map};
use service_binding_controller::cluster::Severity;
use service_binding_controller::controller::reconciler::credentials::transcribe;
use service_binding_controller::controller::reconciler::status::{
    render, render_failure, set_ready_condition, Report,
};
use service_binding_controller::crd::{
    validate_broker, validate_broker_update, Binding, BindingOperation, BindingSpec, Broker,
    BrokerAuthInfo, BrokerSpec, ConditionStatus, LocalObjectReference, SecretReference,
};
use service_binding_controller::error::Failure;

fn binding() -> Binding {
    let mut binding = Binding::new(
        "orders-db",
        BindingSpec {
            instance_ref: LocalObjectReference {
                name: "orders-pg".to_string(),
            },
            secret_name: "orders-db-creds".to_string(),
            external_id: "b-1".to_string(),
            parameters: None,
            pod_preset_template: None,
        },
    );
    binding.metadata.namespace = Some("shop".to_string());
    binding
}

fn broker(url: &str, auth_info: Option<BrokerAuthInfo>) -> Broker {
    Broker::new(
        "db-broker",
        BrokerSpec {
            url: url.to_string(),
            auth_info,
        },
    )
}

fn secret_ref(namespace: &str, name: &str) -> Option<SecretReference> {
    Some(SecretReference {
        namespace: namespace.to_string(),
        name: name.to_string(),
    })
}

// =============================================================================
// Conditions
// =============================================================================

#[test]
fn test_ready_condition_lifecycle() {
    let t0 = "2024-01-01T00:00:00+00:00";
    let t1 = "2024-01-01T00:01:00+00:00";
    let t2 = "2024-01-01T00:02:00+00:00";

    let failing = set_ready_condition(&[], ConditionStatus::False, "BindCallFailed", "boom", t0);
    let still_failing = set_ready_condition(
        &failing,
        ConditionStatus::False,
        "AsyncBindInProgress",
        "working",
        t1,
    );
    let ready = set_ready_condition(
        &still_failing,
        ConditionStatus::True,
        "InjectedBindResult",
        "Injected bind result",
        t2,
    );

    assert_eq!(still_failing[0].last_transition_time.as_deref(), Some(t0));
    assert_eq!(still_failing[0].reason, "AsyncBindInProgress");
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].last_transition_time.as_deref(), Some(t2));
    assert_eq!(ready[0].status, ConditionStatus::True);
}

#[test]
fn test_render_outcomes() {
    let b = binding();

    let bound = render(&b, &Report::Bound);
    assert_eq!(bound.status, ConditionStatus::True);
    assert_eq!(bound.severity, Severity::Normal);
    assert_eq!(bound.message, "Injected bind result");

    let unbound = render(&b, &Report::Unbound);
    assert_eq!(unbound.status, ConditionStatus::False);
    assert_eq!(unbound.reason, "UnboundSuccessfully");
    assert_eq!(unbound.message, "This binding was deleted successfully");

    let failed = render(
        &b,
        &Report::Failed(Failure::NonexistentInstance {
            instance: "shop/orders-pg".to_string(),
        }),
    );
    assert_eq!(failed.severity, Severity::Warning);
    assert_eq!(failed.status, ConditionStatus::False);
}

#[test]
fn test_failure_messages_name_qualified_objects() {
    let b = binding();

    let (reason, message) = render_failure(
        &b,
        &Failure::InstanceOperationInProgress {
            instance: "shop/orders-pg".to_string(),
        },
    );
    assert_eq!(reason, "ErrorAsyncOperationInProgress");
    assert_eq!(
        message,
        "Binding \"shop/orders-db\" trying to bind to Instance \"shop/orders-pg\" that has ongoing asynchronous operation"
    );

    let (reason, message) = render_failure(
        &b,
        &Failure::BrokerRequestFailed {
            operation: BindingOperation::Unbind,
            instance: "shop/orders-pg".to_string(),
            service_class: "postgres".to_string(),
            broker: "db-broker".to_string(),
            detail: "timeout".to_string(),
        },
    );
    assert_eq!(reason, "UnbindCallFailed");
    assert!(message.starts_with("Error unbinding Binding \"shop/orders-db\""));
    assert!(message.ends_with(": timeout"));
}

// =============================================================================
// Credentials
// =============================================================================

#[test]
fn test_transcribe_keeps_strings_raw_and_encodes_the_rest() {
    let mut credentials = Map::new();
    credentials.insert("username".to_string(), json!("app"));
    credentials.insert("port".to_string(), json!(5432));
    credentials.insert("tls".to_string(), json!(true));
    credentials.insert("hosts".to_string(), json!(["a", "b"]));

    let data = transcribe(&credentials);

    assert_eq!(data.len(), 4);
    assert_eq!(data["username"], ByteString(b"app".to_vec()));
    assert_eq!(data["port"], ByteString(b"5432".to_vec()));
    assert_eq!(data["tls"], ByteString(b"true".to_vec()));
    assert_eq!(data["hosts"], ByteString(br#"["a","b"]"#.to_vec()));
}

#[test]
fn test_transcribe_empty() {
    assert!(transcribe(&Map::new()).is_empty());
}

// =============================================================================
// Broker validation
// =============================================================================

#[test]
fn test_valid_brokers() {
    assert!(validate_broker(&broker("https://broker.example.com", None)).is_empty());
    let basic = BrokerAuthInfo {
        basic_auth_secret: secret_ref("brokers", "db-broker-auth"),
        bearer_token_secret: None,
    };
    assert!(validate_broker(&broker("https://broker.example.com", Some(basic))).is_empty());
}

#[test]
fn test_broker_requires_url() {
    let errors = validate_broker(&broker("", None));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "spec.url");
    assert_eq!(errors[0].message, "brokers must have a remote url to contact");
}

#[test]
fn test_broker_auth_info_rules() {
    let none = BrokerAuthInfo::default();
    let errors = validate_broker(&broker("https://b", Some(none)));
    assert_eq!(errors[0].message, "basicAuthSecret or bearerTokenSecret required");

    let both = BrokerAuthInfo {
        basic_auth_secret: secret_ref("brokers", "basic"),
        bearer_token_secret: secret_ref("brokers", "token"),
    };
    let errors = validate_broker(&broker("https://b", Some(both)));
    assert_eq!(errors[0].message, "At most one AuthInfo type allowed");

    let bad_namespace = BrokerAuthInfo {
        basic_auth_secret: None,
        bearer_token_secret: secret_ref("Not_A_Label", "token"),
    };
    let errors = validate_broker(&broker("https://b", Some(bad_namespace)));
    assert!(errors
        .iter()
        .any(|e| e.field == "spec.authInfo.secret.namespace"));
}

#[test]
fn test_broker_update_validates_new_object() {
    let old = broker("https://b", None);
    let new = broker("", None);
    assert!(!validate_broker_update(&new, &old).is_empty());
    assert!(validate_broker_update(&old, &old).is_empty());
}
