//! # Directory Resources
//!
//! Client scopes, groups and users: realm subresources identified by a single name.

use super::common::{CommonSpec, ResourceStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "KeycloakClientScope",
    group = "k8s.rightcrowd.com",
    version = "v1alpha1",
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Realm", "type":"string", "jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientScopeSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    /// Client scope name
    pub id: String,
}

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "KeycloakGroup",
    group = "k8s.rightcrowd.com",
    version = "v1alpha1",
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Realm", "type":"string", "jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakGroupSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    /// Group name
    pub id: String,
}

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "KeycloakUser",
    group = "k8s.rightcrowd.com",
    version = "v1alpha1",
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Realm", "type":"string", "jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"Username", "type":"string", "jsonPath":".spec.username"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUserSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}
