//! # Controller
//!
//! Reconciliation engine of the Keycloak realm operator.
//!
//! - `backoff`: Fibonacci backoff for watch restarts
//! - `cleanup`: Orphan sweep for claim/adopt kinds
//! - `credentials`: Client credential export kind
//! - `hashing`: Salted spec fingerprints
//! - `kind`: Queues, scheduling and watch ingestion of one kind
//! - `queue`: Priority job queue with a single consumer
//! - `reconciler`: Claim/adopt reconciliation
//! - `updater`: Status and fingerprint writes to custom resources

pub mod backoff;
pub mod cleanup;
pub mod credentials;
pub mod hashing;
pub mod kind;
pub mod queue;
pub mod reconciler;
pub mod updater;

use crate::crd::{
    KeycloakClientScopeSpec, KeycloakClientSpec, KeycloakGroupSpec, KeycloakUserSpec,
    ManagedKeycloakRealmSpec,
};
use crate::identity::IdentityApi;
use crate::secrets::SecretStore;
use credentials::CredentialReconciler;
use kind::{ControllerSettings, KindController, Operator};
use reconciler::{ClaimReconciler, ManagedSpec};
use std::sync::Arc;
use updater::CrUpdater;

/// Collaborators shared by every kind controller.
#[derive(Clone)]
pub struct OperatorContext {
    pub updater: CrUpdater,
    pub identity: Arc<dyn IdentityApi>,
    pub secrets: Arc<dyn SecretStore>,
    pub settings: ControllerSettings,
}

impl std::fmt::Debug for OperatorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OperatorContext {
    fn claim_operator<S: ManagedSpec>(&self) -> Arc<dyn Operator> {
        let reconciler = ClaimReconciler::<S>::new(
            Arc::clone(&self.identity),
            Arc::clone(&self.secrets),
            self.updater.clone(),
        );
        Arc::new(KindController::new(
            reconciler,
            self.updater.clone(),
            self.settings,
        ))
    }

    /// One controller per custom resource kind.
    #[must_use]
    pub fn operators(&self) -> Vec<Arc<dyn Operator>> {
        let credentials = CredentialReconciler::new(
            Arc::clone(&self.identity),
            Arc::clone(&self.secrets),
            self.updater.clone(),
        );
        vec![
            self.claim_operator::<ManagedKeycloakRealmSpec>(),
            self.claim_operator::<KeycloakClientSpec>(),
            self.claim_operator::<KeycloakClientScopeSpec>(),
            self.claim_operator::<KeycloakGroupSpec>(),
            self.claim_operator::<KeycloakUserSpec>(),
            Arc::new(KindController::new(
                credentials,
                self.updater.clone(),
                self.settings,
            )),
        ]
    }
}
