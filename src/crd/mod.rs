//! # Custom Resource Definitions
//!
//! CRD types served by the Keycloak realm operator.
//!
//! ## Module Structure
//!
//! - `common.rs` - Fields shared by every claim/adopt kind, status and schema helpers
//! - `realm.rs` - `ManagedKeycloakRealm`
//! - `client.rs` - `KeycloakClient` and its secret/scope configuration
//! - `directory.rs` - `KeycloakClientScope`, `KeycloakGroup`, `KeycloakUser`
//! - `credential.rs` - `KeycloakClientCredential` (client secret export)

mod client;
mod common;
mod credential;
mod directory;
mod realm;

pub use client::{
    ClientScopesConfig, ClientSecretSpec, KeycloakClient, KeycloakClientSpec, SecretKeyRef,
    SecretValueSource,
};
pub use common::{
    default_false, default_true, preserve_unknown_fields, CommonSpec, ResourceStatus, SyncState,
};
pub use credential::{
    CredentialKeys, FallbackStrategy, KeycloakClientCredential, KeycloakClientCredentialSpec,
    SecretTemplate,
};
pub use directory::{
    KeycloakClientScope, KeycloakClientScopeSpec, KeycloakGroup, KeycloakGroupSpec, KeycloakUser,
    KeycloakUserSpec,
};
pub use realm::{IfResourceExists, ManagedKeycloakRealm, ManagedKeycloakRealmSpec, RealmImport};
