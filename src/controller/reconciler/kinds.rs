//! [`ManagedSpec`] for every claim/adopt kind.

use super::scopes::reconcile_client_scopes;
use super::{ConvergeContext, ManagedSpec};
use crate::crd::{
    ClientSecretSpec, CommonSpec, KeycloakClient, KeycloakClientScope, KeycloakClientScopeSpec,
    KeycloakClientSpec, KeycloakGroup, KeycloakGroupSpec, KeycloakUser, KeycloakUserSpec,
    ManagedKeycloakRealm, ManagedKeycloakRealmSpec,
};
use crate::error::ReconcileError;
use crate::identity::{Attributes, Representation, ResourceType, Scope};
use crate::secrets::SecretStore;
use crate::transport::ResourceKind;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

#[async_trait]
impl ManagedSpec for ManagedKeycloakRealmSpec {
    const RESOURCE_TYPE: ResourceType = ResourceType::Realm;
    const LOOKUP_KEYS: &'static [&'static str] = &["realm"];

    fn kind() -> ResourceKind {
        ResourceKind::of::<ManagedKeycloakRealm>()
    }

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn scope(&self) -> Scope {
        Scope::Root
    }

    fn lookup(&self) -> Representation {
        Representation::from_fields([("realm", Some(self.common.realm.as_str()))])
    }

    fn create_fields(&self) -> Representation {
        Representation::from_fields([
            ("realm", Some(self.common.realm.as_str())),
            ("displayName", self.display_name.as_deref()),
        ])
    }

    fn human_readable(&self) -> String {
        self.common.realm.clone()
    }

    async fn after_converge(&self, ctx: &ConvergeContext<'_>) -> Result<(), ReconcileError> {
        for (index, realm_import) in self.realm_imports.iter().enumerate() {
            info!(
                "Performing partial import (index {index}) for realm {}",
                self.common.realm
            );
            let mut body = Representation::new();
            body.insert("ifResourceExists", json!(realm_import.if_resource_exists));
            if let Some(import) = Representation::from_value(realm_import.import.clone()) {
                body.overlay(&import);
            }
            ctx.identity
                .partial_import(&self.common.realm, &body.into_value())
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ManagedSpec for KeycloakClientSpec {
    const RESOURCE_TYPE: ResourceType = ResourceType::Client;
    const LOOKUP_KEYS: &'static [&'static str] = &["clientId"];

    fn kind() -> ResourceKind {
        ResourceKind::of::<KeycloakClient>()
    }

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn lookup(&self) -> Representation {
        Representation::from_fields([("clientId", Some(self.client_id.as_str()))])
    }

    fn create_fields(&self) -> Representation {
        Representation::from_fields([
            ("clientId", Some(self.client_id.as_str())),
            ("name", self.name.as_deref()),
        ])
    }

    fn human_readable(&self) -> String {
        self.client_id.clone()
    }

    async fn converge_extras(
        &self,
        ctx: &ConvergeContext<'_>,
    ) -> Result<Representation, ReconcileError> {
        let mut extras = Representation::new();
        if let Some(secret) = resolve_client_secret(self.secret.as_ref(), ctx.secrets).await? {
            extras.insert("secret", Value::String(secret));
        }
        Ok(extras)
    }

    async fn after_converge(&self, ctx: &ConvergeContext<'_>) -> Result<(), ReconcileError> {
        let (Some(scopes), Some(realm)) = (&self.scopes, ctx.scope.realm()) else {
            return Ok(());
        };
        reconcile_client_scopes(ctx.identity, realm, ctx.key, scopes).await
    }
}

/// Inline value first, then the referenced Secret key. Missing references yield `None`.
pub async fn resolve_client_secret(
    secret: Option<&ClientSecretSpec>,
    store: &dyn SecretStore,
) -> Result<Option<String>, ReconcileError> {
    let Some(secret) = secret else {
        return Ok(None);
    };
    if let Some(value) = &secret.value {
        return Ok(Some(value.clone()));
    }
    match &secret.value_from {
        Some(source) => Ok(store.read_key(&source.secret_key_ref).await?),
        None => Ok(None),
    }
}

#[async_trait]
impl ManagedSpec for KeycloakClientScopeSpec {
    const RESOURCE_TYPE: ResourceType = ResourceType::ClientScope;
    const LOOKUP_KEYS: &'static [&'static str] = &["name"];

    fn kind() -> ResourceKind {
        ResourceKind::of::<KeycloakClientScope>()
    }

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn lookup(&self) -> Representation {
        Representation::from_fields([("name", Some(self.id.as_str()))])
    }

    fn human_readable(&self) -> String {
        self.id.clone()
    }

    fn default_attributes() -> Attributes {
        [
            ("display.on.consent.screen", "true"),
            ("consent.screen.text", ""),
            ("include.in.token.scope", "false"),
            ("gui.order", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
    }
}

#[async_trait]
impl ManagedSpec for KeycloakGroupSpec {
    const RESOURCE_TYPE: ResourceType = ResourceType::Group;
    const LOOKUP_KEYS: &'static [&'static str] = &["name"];

    fn kind() -> ResourceKind {
        ResourceKind::of::<KeycloakGroup>()
    }

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn lookup(&self) -> Representation {
        Representation::from_fields([("name", Some(self.id.as_str()))])
    }

    fn human_readable(&self) -> String {
        self.id.clone()
    }
}

#[async_trait]
impl ManagedSpec for KeycloakUserSpec {
    const RESOURCE_TYPE: ResourceType = ResourceType::User;
    const LOOKUP_KEYS: &'static [&'static str] = &["username"];

    fn kind() -> ResourceKind {
        ResourceKind::of::<KeycloakUser>()
    }

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn lookup(&self) -> Representation {
        Representation::from_fields([("username", Some(self.username.as_str()))])
    }

    fn create_fields(&self) -> Representation {
        Representation::from_fields([
            ("username", Some(self.username.as_str())),
            ("email", self.email.as_deref()),
            ("firstName", self.first_name.as_deref()),
            ("lastName", self.last_name.as_deref()),
        ])
    }

    fn human_readable(&self) -> String {
        self.username.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_resolve_to_crd_identities() {
        let realm = <ManagedKeycloakRealmSpec as ManagedSpec>::kind();
        assert_eq!(realm.plural, "managedkeycloakrealms");
        assert!(!realm.namespaced);
        assert_eq!(
            <KeycloakClientScopeSpec as ManagedSpec>::kind().api_version(),
            "k8s.rightcrowd.com/v1alpha1"
        );
    }

    #[test]
    fn test_user_create_fields_skip_unset_values() {
        let spec: KeycloakUserSpec = serde_json::from_value(json!({
            "realm": "acme",
            "username": "alice",
            "email": "alice@example.com"
        }))
        .expect("spec");
        let fields = spec.create_fields();
        assert_eq!(fields.get_str("email"), Some("alice@example.com"));
        assert!(!fields.contains_key("firstName"));
        assert_eq!(spec.lookup().keys().count(), 1);
    }

    #[test]
    fn test_realm_lives_at_root() {
        let spec: ManagedKeycloakRealmSpec =
            serde_json::from_value(json!({"realm": "acme"})).expect("spec");
        assert_eq!(spec.scope(), Scope::Root);
        assert_eq!(spec.lookup().get_str("realm"), Some("acme"));
    }
}
