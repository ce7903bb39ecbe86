//! # Managed Realm

use super::common::{preserve_unknown_fields, CommonSpec, ResourceStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Keycloak realm owned by the operator.
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ManagedKeycloakRealm",
    group = "k8s.rightcrowd.com",
    version = "v1alpha1",
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Realm", "type":"string", "jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedKeycloakRealmSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Partial imports applied in order after every successful update
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_imports: Vec<RealmImport>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealmImport {
    pub if_resource_exists: IfResourceExists,
    /// `PartialImportRepresentation` without `ifResourceExists`
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub import: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IfResourceExists {
    Fail,
    Skip,
    Overwrite,
}
