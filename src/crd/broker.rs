//! # Broker
//!
//! Broker resource and its admission-style validation rules.

use kube::{CustomResource, ResourceExt};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static DNS1123_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS-1123 label pattern is valid")
});

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS-1123 subdomain pattern is valid")
});

const DNS1123_LABEL_MAX_LENGTH: usize = 63;
const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

/// Broker Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: servicecatalog.microscaler.io/v1
/// kind: Broker
/// metadata:
///   name: db-broker
/// spec:
///   url: https://db-broker.example.com
///   authInfo:
///     basicAuthSecret:
///       namespace: brokers
///       name: db-broker-auth
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[kube(
    kind = "Broker",
    group = "servicecatalog.microscaler.io",
    version = "v1",
    shortname = "sbr",
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSpec {
    /// Base URL of the Open Service Broker API
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<BrokerAuthInfo>,
}

/// Credentials used to call the broker
///
/// Exactly one secret reference must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokerAuthInfo {
    /// Secret with `username` and `password` keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_secret: Option<SecretReference>,
    /// Secret with a `token` key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token_secret: Option<SecretReference>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct SecretReference {
    pub namespace: String,
    pub name: String,
}

/// A single validation failure, addressed by field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates a Broker's name and spec
pub fn validate_broker(broker: &Broker) -> Vec<FieldError> {
    let mut errors = Vec::new();

    for msg in dns1123_subdomain_errors(&broker.name_any()) {
        errors.push(FieldError::new("metadata.name", msg));
    }

    let spec = &broker.spec;
    if spec.url.is_empty() {
        errors.push(FieldError::new(
            "spec.url",
            "brokers must have a remote url to contact",
        ));
    }

    if let Some(auth) = &spec.auth_info {
        match (&auth.basic_auth_secret, &auth.bearer_token_secret) {
            (None, None) => errors.push(FieldError::new(
                "spec.authInfo",
                "basicAuthSecret or bearerTokenSecret required",
            )),
            (Some(_), Some(_)) => errors.push(FieldError::new(
                "spec.authInfo",
                "At most one AuthInfo type allowed",
            )),
            (Some(secret), None) | (None, Some(secret)) => {
                for msg in dns1123_label_errors(&secret.namespace) {
                    errors.push(FieldError::new("spec.authInfo.secret.namespace", msg));
                }
                for msg in dns1123_subdomain_errors(&secret.name) {
                    errors.push(FieldError::new("spec.authInfo.secret.name", msg));
                }
            }
        }
    }

    errors
}

/// Validates a Broker update; both the new and the old object must be valid
pub fn validate_broker_update(new: &Broker, old: &Broker) -> Vec<FieldError> {
    let mut errors = validate_broker(new);
    errors.extend(validate_broker(old));
    errors
}

fn dns1123_label_errors(value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if value.len() > DNS1123_LABEL_MAX_LENGTH {
        errors.push(format!(
            "must be no more than {DNS1123_LABEL_MAX_LENGTH} characters"
        ));
    }
    if !DNS1123_LABEL.is_match(value) {
        errors.push(
            "a DNS-1123 label must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    errors
}

fn dns1123_subdomain_errors(value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if value.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errors.push(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LENGTH} characters"
        ));
    }
    if !DNS1123_SUBDOMAIN.is_match(value) {
        errors.push(
            "a DNS-1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(name: &str, url: &str, auth_info: Option<BrokerAuthInfo>) -> Broker {
        Broker::new(
            name,
            BrokerSpec {
                url: url.to_string(),
                auth_info,
            },
        )
    }

    fn secret(namespace: &str, name: &str) -> SecretReference {
        SecretReference {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_valid_broker_without_auth() {
        assert!(validate_broker(&broker("db-broker", "http://broker", None)).is_empty());
    }

    #[test]
    fn test_broker_requires_url() {
        let errors = validate_broker(&broker("db-broker", "", None));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.url");
    }

    #[test]
    fn test_broker_name_must_be_dns_subdomain() {
        let errors = validate_broker(&broker("Db_Broker", "http://broker", None));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "metadata.name");
    }

    #[test]
    fn test_auth_info_needs_exactly_one_secret() {
        let none = broker("b", "http://broker", Some(BrokerAuthInfo::default()));
        assert_eq!(
            validate_broker(&none)[0].message,
            "basicAuthSecret or bearerTokenSecret required"
        );

        let both = broker(
            "b",
            "http://broker",
            Some(BrokerAuthInfo {
                basic_auth_secret: Some(secret("ns", "basic")),
                bearer_token_secret: Some(secret("ns", "token")),
            }),
        );
        assert_eq!(
            validate_broker(&both)[0].message,
            "At most one AuthInfo type allowed"
        );
    }

    #[test]
    fn test_auth_secret_reference_is_validated() {
        let bad = broker(
            "b",
            "http://broker",
            Some(BrokerAuthInfo {
                basic_auth_secret: None,
                bearer_token_secret: Some(secret("Bad.Namespace", "token")),
            }),
        );
        let errors = validate_broker(&bad);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.authInfo.secret.namespace");
    }

    #[test]
    fn test_update_validates_both_objects() {
        let good = broker("b", "http://broker", None);
        let bad = broker("b", "", None);
        assert_eq!(validate_broker_update(&good, &bad).len(), 1);
        assert_eq!(validate_broker_update(&bad, &bad).len(), 2);
    }
}
