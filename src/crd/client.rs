//! # Keycloak Client
//!
//! OIDC/SAML client inside a realm, plus the sources its secret can come from and the
//! client scopes bound to it.

use super::common::{CommonSpec, ResourceStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "KeycloakClient",
    group = "k8s.rightcrowd.com",
    version = "v1alpha1",
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Realm", "type":"string", "jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"Client", "type":"string", "jsonPath":".spec.clientId"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<ClientSecretSpec>,
    /// Client scopes bound to the client. Bindings not listed here are removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<ClientScopesConfig>,
}

/// Secret of a confidential client: inline `value` or a reference to a Kubernetes Secret.
/// `value` wins when both are set.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecretSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<SecretValueSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretValueSource {
    pub secret_key_ref: SecretKeyRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

/// Client scope names by binding type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientScopesConfig {
    #[serde(default)]
    pub default: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}
