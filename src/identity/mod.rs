//! # Identity Service
//!
//! Boundary to the identity-management service (Keycloak). The reconciliation engine
//! only talks to [`IdentityApi`]; [`keycloak::KeycloakAdminClient`] is the REST
//! implementation used in production.

pub mod keycloak;
pub mod representation;

use crate::error::IdentityError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub use keycloak::{KeycloakAdminClient, KeycloakSettings};
pub use representation::{attribute_text, AttributePatch, Attributes, Representation};

/// Identity-service subresource types managed through the claim/adopt engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Realm,
    Client,
    ClientScope,
    Group,
    User,
}

impl ResourceType {
    /// Path segment of the collection under `/admin/realms/{realm}`.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Realm => "realms",
            Self::Client => "clients",
            Self::ClientScope => "client-scopes",
            Self::Group => "groups",
            Self::User => "users",
        }
    }

    /// Field addressing an object of this type in item URLs.
    #[must_use]
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Realm => "realm",
            _ => "id",
        }
    }

    /// Fields the identity service refuses to change through an update.
    #[must_use]
    pub fn immutable_fields(self) -> &'static [&'static str] {
        match self {
            Self::Realm => &["id", "realm"],
            _ => &["id"],
        }
    }

    /// Users and groups store attributes as `map<string, list<string>>`.
    #[must_use]
    pub fn multivalued_attributes(self) -> bool {
        matches!(self, Self::User | Self::Group)
    }

    /// Key of an object in item URLs.
    #[must_use]
    pub fn key_of(self, rep: &Representation) -> Option<String> {
        rep.get_str(self.key_field()).map(str::to_string)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Realm => "realm",
            Self::Client => "client",
            Self::ClientScope => "client scope",
            Self::Group => "group",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// Parent container of a subresource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Top level; realms live here.
    Root,
    /// Inside the named realm.
    Realm(String),
}

impl Scope {
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Realm(name) => Some(name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("<root>"),
            Self::Realm(name) => write!(f, "realm {name}"),
        }
    }
}

/// Kind of client-scope binding on a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeBinding {
    Default,
    Optional,
}

impl ScopeBinding {
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Default => "default-client-scopes",
            Self::Optional => "optional-client-scopes",
        }
    }
}

/// Operations the reconciliation engine needs from the identity service.
///
/// `key` arguments are the value of [`ResourceType::key_field`]: the realm name for
/// realms and the service-assigned id otherwise.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// List objects in `scope`. Fields of `filter` narrow the listing where the
    /// service supports it; callers still apply an exact match themselves.
    async fn find(
        &self,
        resource: ResourceType,
        scope: &Scope,
        filter: &Representation,
    ) -> Result<Vec<Representation>, IdentityError>;

    /// Fetch one object, `None` when it does not exist.
    async fn find_one(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<Representation>, IdentityError>;

    /// Create an object and return its key.
    async fn create(
        &self,
        resource: ResourceType,
        scope: &Scope,
        body: &Representation,
    ) -> Result<String, IdentityError>;

    async fn update(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
        body: &Representation,
    ) -> Result<(), IdentityError>;

    async fn delete(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
    ) -> Result<(), IdentityError>;

    async fn list_scope_bindings(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
    ) -> Result<Vec<Representation>, IdentityError>;

    async fn add_scope_binding(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
        scope_key: &str,
    ) -> Result<(), IdentityError>;

    async fn remove_scope_binding(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
        scope_key: &str,
    ) -> Result<(), IdentityError>;

    /// Current secret of a confidential client, `None` for public clients.
    async fn client_secret(
        &self,
        realm: &str,
        client_key: &str,
    ) -> Result<Option<String>, IdentityError>;

    /// Partial import into an existing realm.
    async fn partial_import(&self, realm: &str, body: &Value) -> Result<(), IdentityError>;
}
