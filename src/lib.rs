//! Keycloak Realm Operator Library
//!
//! Keeps Keycloak realms, clients, client scopes, groups, users and client secret
//! exports in sync with Kubernetes custom resources.
//!
//! The reconciliation engine in [`controller`] depends only on the traits at its
//! boundaries: [`transport::CrTransport`] for custom resources, [`identity::IdentityApi`]
//! for Keycloak, [`secrets::SecretStore`] for Kubernetes Secrets and
//! [`store::SharedStore`] for the hashing salt.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod identity;
pub mod observability;
pub mod secrets;
pub mod server;
pub mod store;
pub mod transport;
