//! # Client Scope Bindings
//!
//! Default and optional client-scope bindings of a client are a set relation, so unlike
//! the rest of the representation they are diffed rather than overwritten.

use crate::crd::ClientScopesConfig;
use crate::error::ReconcileError;
use crate::identity::{IdentityApi, Representation, ResourceType, Scope, ScopeBinding};
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Bindings to remove and to add, by scope name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingDiff {
    pub lingering: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

impl BindingDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lingering.is_empty() && self.missing.is_empty()
    }
}

/// `lingering = actual − desired`, `missing = desired − actual`.
#[must_use]
pub fn diff_bindings(actual: &BTreeSet<String>, desired: &BTreeSet<String>) -> BindingDiff {
    BindingDiff {
        lingering: actual.difference(desired).cloned().collect(),
        missing: desired.difference(actual).cloned().collect(),
    }
}

fn ids_by_name(reps: &[Representation]) -> BTreeMap<String, String> {
    reps.iter()
        .filter_map(|r| Some((r.get_str("name")?.to_string(), r.id()?.to_string())))
        .collect()
}

/// Bring both binding types of one client in line with `desired`.
///
/// Removals use the ids of the bound scopes; additions resolve names through a full
/// scope listing. Names that resolve to nothing are logged and skipped.
pub async fn reconcile_client_scopes(
    identity: &dyn IdentityApi,
    realm: &str,
    client_key: &str,
    desired: &ClientScopesConfig,
) -> Result<(), ReconcileError> {
    let realm_scope = Scope::Realm(realm.to_string());
    let no_filter = Representation::new();
    let (actual_default, actual_optional, all_scopes) = futures::try_join!(
        identity.list_scope_bindings(realm, client_key, ScopeBinding::Default),
        identity.list_scope_bindings(realm, client_key, ScopeBinding::Optional),
        identity.find(ResourceType::ClientScope, &realm_scope, &no_filter),
    )?;
    let realm_scopes = ids_by_name(&all_scopes);

    let plans = [
        (ScopeBinding::Default, ids_by_name(&actual_default), &desired.default),
        (ScopeBinding::Optional, ids_by_name(&actual_optional), &desired.optional),
    ];

    let mut removals = Vec::new();
    let mut additions = Vec::new();
    for (binding, bound, wanted) in &plans {
        let actual: BTreeSet<String> = bound.keys().cloned().collect();
        let wanted: BTreeSet<String> = wanted.iter().cloned().collect();
        let diff = diff_bindings(&actual, &wanted);
        if diff.is_empty() {
            continue;
        }
        debug!(
            "Client {client_key} in realm {realm}: {binding:?} scopes to remove {:?}, to add {:?}",
            diff.lingering, diff.missing
        );
        for name in &diff.lingering {
            if let Some(id) = bound.get(name) {
                removals.push(identity.remove_scope_binding(realm, client_key, *binding, id));
            }
        }
        for name in diff.missing {
            match realm_scopes.get(&name) {
                Some(id) => {
                    additions.push(identity.add_scope_binding(realm, client_key, *binding, id));
                }
                None => warn!(
                    "Client scope {name} requested for client {client_key} does not exist in realm {realm}"
                ),
            }
        }
    }

    futures::try_join!(try_join_all(removals), try_join_all(additions))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_diff_touches_only_changed_bindings() {
        let diff = diff_bindings(&set(&["A", "B", "C"]), &set(&["B", "C", "D"]));
        assert_eq!(diff.lingering, set(&["A"]));
        assert_eq!(diff.missing, set(&["D"]));
    }

    #[test]
    fn test_diff_of_equal_sets_is_empty() {
        assert!(diff_bindings(&set(&["profile"]), &set(&["profile"])).is_empty());
    }
}
