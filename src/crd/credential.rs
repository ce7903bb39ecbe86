//! # Client Credential Export
//!
//! Copies a Keycloak client's id and secret into a Kubernetes Secret next to the CR.

use super::common::ResourceStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "KeycloakClientCredential",
    group = "k8s.rightcrowd.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Client", "type":"string", "jsonPath":".spec.clientId"}"#,
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".spec.targetSecretName"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientCredentialSpec {
    /// Secret written in the namespace of this resource
    pub target_secret_name: String,
    #[serde(default)]
    pub keys: CredentialKeys,
    /// Data keys rendered from templates; replaces `keys` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_secret_template: Option<Vec<SecretTemplate>>,
    pub realm: String,
    pub client_id: String,
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
}

/// Data key names of the exported values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialKeys {
    #[serde(default = "default_client_id_property")]
    pub client_id_property: String,
    #[serde(default = "default_client_secret_property")]
    pub client_secret_property: String,
    #[serde(default = "default_realm_property")]
    pub realm_property: String,
}

impl Default for CredentialKeys {
    fn default() -> Self {
        Self {
            client_id_property: default_client_id_property(),
            client_secret_property: default_client_secret_property(),
            realm_property: default_realm_property(),
        }
    }
}

fn default_client_id_property() -> String {
    "clientId".to_string()
}

fn default_client_secret_property() -> String {
    "clientSecret".to_string()
}

fn default_realm_property() -> String {
    "realm".to_string()
}

/// One data key rendered from a template such as `{{ .clientId }}:{{ .clientSecret }}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretTemplate {
    pub key: String,
    pub template: String,
}

/// What to do when the client or its secret cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    /// Fail the pass
    Error,
    /// Mark the resource failed and move on quietly
    #[default]
    Skip,
}
