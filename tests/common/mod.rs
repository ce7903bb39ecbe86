//! In-memory fakes of the operator's collaborators.
//!
//! - [`FakeIdentity`]: Keycloak-like store of realms and their subresources
//! - [`FakeTransport`]: custom resources with JSON merge patch and an event log
//! - [`FakeSecretStore`]: Kubernetes Secrets
//! - [`Harness`]: all of the above wired to a hash store over [`MemoryStore`]

#![allow(dead_code, reason = "each test crate uses a different subset")]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use keycloak_realm_operator::controller::credentials::CredentialReconciler;
use keycloak_realm_operator::controller::hashing::HashStore;
use keycloak_realm_operator::controller::reconciler::{ClaimReconciler, ManagedSpec};
use keycloak_realm_operator::controller::updater::CrUpdater;
use keycloak_realm_operator::crd::SecretKeyRef;
use keycloak_realm_operator::error::{IdentityError, SecretStoreError, TransportError};
use keycloak_realm_operator::identity::{
    IdentityApi, Representation, ResourceType, Scope, ScopeBinding,
};
use keycloak_realm_operator::secrets::{ManagedSecret, SecretStore};
use keycloak_realm_operator::store::{MemoryStore, SharedStore};
use keycloak_realm_operator::transport::{
    AuditEvent, CrTransport, ResourceKind, Selector, WatchEvent,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Identity service
// ============================================================================

/// A mutating call observed by [`FakeIdentity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(ResourceType, String),
    Update(ResourceType, String),
    Delete(ResourceType, String),
    AddBinding(ScopeBinding, String),
    RemoveBinding(ScopeBinding, String),
    PartialImport(String),
}

#[derive(Debug, Default)]
pub struct FakeIdentity {
    objects: Mutex<BTreeMap<(ResourceType, Scope), Vec<Representation>>>,
    bindings: Mutex<BTreeMap<(String, ScopeBinding), BTreeSet<String>>>,
    imports: Mutex<Vec<(String, Value)>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
}

fn not_found(path: String) -> IdentityError {
    IdentityError::Status {
        method: "GET".to_string(),
        path,
        status: 404,
        body: String::new(),
    }
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_id(&self) -> String {
        format!("id-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn realm_exists(&self, realm: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .get(&(ResourceType::Realm, Scope::Root))
            .is_some_and(|realms| realms.iter().any(|r| r.get_str("realm") == Some(realm)))
    }

    fn check_scope(&self, scope: &Scope) -> Result<(), IdentityError> {
        match scope.realm() {
            Some(realm) if !self.realm_exists(realm) => {
                Err(not_found(format!("/admin/realms/{realm}")))
            }
            _ => Ok(()),
        }
    }

    /// Store an object directly, bypassing call recording. Returns its key.
    pub fn seed(&self, resource: ResourceType, scope: &Scope, value: Value) -> String {
        let mut rep = Representation::from_value(value).expect("object");
        if rep.id().is_none() {
            rep.insert("id", json!(self.new_id()));
        }
        let key = resource.key_of(&rep).expect("key");
        self.objects
            .lock()
            .unwrap()
            .entry((resource, scope.clone()))
            .or_default()
            .push(rep);
        key
    }

    pub fn seed_realm(&self, realm: &str) {
        self.seed(ResourceType::Realm, &Scope::Root, json!({ "realm": realm }));
    }

    pub fn objects(&self, resource: ResourceType, scope: &Scope) -> Vec<Representation> {
        self.objects
            .lock()
            .unwrap()
            .get(&(resource, scope.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn object(&self, resource: ResourceType, scope: &Scope, key: &str) -> Option<Representation> {
        self.objects(resource, scope)
            .into_iter()
            .find(|r| resource.key_of(r).as_deref() == Some(key))
    }

    pub fn bind(&self, client_key: &str, binding: ScopeBinding, scope_id: &str) {
        self.bindings
            .lock()
            .unwrap()
            .entry((client_key.to_string(), binding))
            .or_default()
            .insert(scope_id.to_string());
    }

    pub fn bound(&self, client_key: &str, binding: ScopeBinding) -> BTreeSet<String> {
        self.bindings
            .lock()
            .unwrap()
            .get(&(client_key.to_string(), binding))
            .cloned()
            .unwrap_or_default()
    }

    pub fn imports(&self) -> Vec<(String, Value)> {
        self.imports.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Keycloak update semantics for the attribute bag. Users and groups store every
/// value as a list.
fn apply_attributes(resource: ResourceType, stored: &mut Representation, body: &Value) {
    let Value::Object(incoming) = body else {
        return;
    };
    let mut attributes: Map<String, Value> = if resource.multivalued_attributes() {
        Map::new()
    } else {
        match stored.get("attributes") {
            Some(Value::Object(current)) => current.clone(),
            _ => Map::new(),
        }
    };
    for (key, value) in incoming {
        match value {
            Value::Null => {
                attributes.remove(key);
            }
            Value::Array(_) => {
                attributes.insert(key.clone(), value.clone());
            }
            scalar if resource.multivalued_attributes() => {
                attributes.insert(key.clone(), json!([scalar]));
            }
            scalar => {
                attributes.insert(key.clone(), scalar.clone());
            }
        }
    }
    stored.insert("attributes", Value::Object(attributes));
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn find(
        &self,
        resource: ResourceType,
        scope: &Scope,
        filter: &Representation,
    ) -> Result<Vec<Representation>, IdentityError> {
        self.check_scope(scope)?;
        Ok(self
            .objects(resource, scope)
            .into_iter()
            .filter(|r| r.matches(filter))
            .collect())
    }

    async fn find_one(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<Representation>, IdentityError> {
        self.check_scope(scope)?;
        Ok(self.object(resource, scope, key))
    }

    async fn create(
        &self,
        resource: ResourceType,
        scope: &Scope,
        body: &Representation,
    ) -> Result<String, IdentityError> {
        self.check_scope(scope)?;
        let mut rep = body.clone();
        rep.insert("id", json!(self.new_id()));
        let attributes = rep.remove("attributes").unwrap_or(Value::Null);
        apply_attributes(resource, &mut rep, &attributes);
        let key = resource.key_of(&rep).expect("key");
        self.objects
            .lock()
            .unwrap()
            .entry((resource, scope.clone()))
            .or_default()
            .push(rep);
        self.record(Call::Create(resource, key.clone()));
        Ok(key)
    }

    async fn update(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
        body: &Representation,
    ) -> Result<(), IdentityError> {
        self.check_scope(scope)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&(resource, scope.clone()))
            .and_then(|reps| {
                reps.iter_mut()
                    .find(|r| resource.key_of(r).as_deref() == Some(key))
            })
            .ok_or_else(|| not_found(format!("{resource}/{key}")))?;
        for (field, value) in body.as_map() {
            if field == "attributes" {
                apply_attributes(resource, stored, value);
            } else {
                stored.insert(field.clone(), value.clone());
            }
        }
        drop(objects);
        self.record(Call::Update(resource, key.to_string()));
        Ok(())
    }

    async fn delete(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
    ) -> Result<(), IdentityError> {
        if let Some(reps) = self
            .objects
            .lock()
            .unwrap()
            .get_mut(&(resource, scope.clone()))
        {
            reps.retain(|r| resource.key_of(r).as_deref() != Some(key));
        }
        self.record(Call::Delete(resource, key.to_string()));
        Ok(())
    }

    async fn list_scope_bindings(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
    ) -> Result<Vec<Representation>, IdentityError> {
        let bound = self.bound(client_key, binding);
        Ok(self
            .objects(ResourceType::ClientScope, &Scope::Realm(realm.to_string()))
            .into_iter()
            .filter(|s| s.id().is_some_and(|id| bound.contains(id)))
            .collect())
    }

    async fn add_scope_binding(
        &self,
        _realm: &str,
        client_key: &str,
        binding: ScopeBinding,
        scope_key: &str,
    ) -> Result<(), IdentityError> {
        self.bind(client_key, binding, scope_key);
        self.record(Call::AddBinding(binding, scope_key.to_string()));
        Ok(())
    }

    async fn remove_scope_binding(
        &self,
        _realm: &str,
        client_key: &str,
        binding: ScopeBinding,
        scope_key: &str,
    ) -> Result<(), IdentityError> {
        if let Some(bound) = self
            .bindings
            .lock()
            .unwrap()
            .get_mut(&(client_key.to_string(), binding))
        {
            bound.remove(scope_key);
        }
        self.record(Call::RemoveBinding(binding, scope_key.to_string()));
        Ok(())
    }

    async fn client_secret(
        &self,
        realm: &str,
        client_key: &str,
    ) -> Result<Option<String>, IdentityError> {
        let scope = Scope::Realm(realm.to_string());
        self.check_scope(&scope)?;
        Ok(self
            .object(ResourceType::Client, &scope, client_key)
            .and_then(|c| c.get_str("secret").map(str::to_string)))
    }

    async fn partial_import(&self, realm: &str, body: &Value) -> Result<(), IdentityError> {
        self.imports
            .lock()
            .unwrap()
            .push((realm.to_string(), body.clone()));
        self.record(Call::PartialImport(realm.to_string()));
        Ok(())
    }
}

// ============================================================================
// Custom resource transport
// ============================================================================

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    let object = target.as_object_mut().expect("object");
    for (key, value) in fields {
        if value.is_null() {
            object.remove(key);
        } else {
            merge_patch(object.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

type WatchBatch = Vec<Result<WatchEvent, TransportError>>;

#[derive(Debug, Default)]
pub struct FakeTransport {
    objects: Mutex<HashMap<Selector, Value>>,
    events: Mutex<Vec<(Selector, AuditEvent)>>,
    patches: AtomicU64,
    watches: Mutex<VecDeque<WatchBatch>>,
    watch_calls: AtomicU64,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: &ResourceKind, object: Value) -> Selector {
        let selector = Selector::from_object(kind, &object).expect("selector");
        self.objects
            .lock()
            .unwrap()
            .insert(selector.clone(), object);
        selector
    }

    pub fn remove(&self, selector: &Selector) -> Option<Value> {
        self.objects.lock().unwrap().remove(selector)
    }

    pub fn object(&self, selector: &Selector) -> Value {
        self.objects
            .lock()
            .unwrap()
            .get(selector)
            .cloned()
            .expect("custom resource")
    }

    pub fn state(&self, selector: &Selector) -> Option<String> {
        self.object(selector)
            .pointer("/status/state")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    pub fn patch_count(&self) -> u64 {
        self.patches.load(Ordering::Relaxed)
    }

    /// Queue the events delivered by the next call to `watch`.
    pub fn push_watch(&self, batch: WatchBatch) {
        self.watches.lock().unwrap().push_back(batch);
    }

    pub fn watch_calls(&self) -> u64 {
        self.watch_calls.load(Ordering::Relaxed)
    }

    fn apply(&self, selector: &Selector, patch: &Value) -> Result<(), TransportError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(selector)
            .ok_or_else(|| TransportError::NotFound(selector.to_string()))?;
        merge_patch(object, patch);
        self.patches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl CrTransport for FakeTransport {
    async fn get(&self, selector: &Selector) -> Result<Value, TransportError> {
        self.objects
            .lock()
            .unwrap()
            .get(selector)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(selector.to_string()))
    }

    async fn list(&self, kind: &ResourceKind) -> Result<Vec<Value>, TransportError> {
        let mut listed: Vec<(String, Value)> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(selector, _)| &selector.kind == kind)
            .map(|(selector, object)| (selector.to_string(), object.clone()))
            .collect();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(listed.into_iter().map(|(_, object)| object).collect())
    }

    async fn patch(&self, selector: &Selector, patch: &Value) -> Result<(), TransportError> {
        self.apply(selector, patch)
    }

    async fn patch_status(
        &self,
        selector: &Selector,
        patch: &Value,
    ) -> Result<(), TransportError> {
        self.apply(selector, patch)
    }

    async fn publish_event(
        &self,
        selector: &Selector,
        _uid: Option<&str>,
        event: &AuditEvent,
    ) -> Result<(), TransportError> {
        self.events
            .lock()
            .unwrap()
            .push((selector.clone(), event.clone()));
        Ok(())
    }

    fn watch(&self, _kind: &ResourceKind) -> BoxStream<'static, Result<WatchEvent, TransportError>> {
        self.watch_calls.fetch_add(1, Ordering::Relaxed);
        match self.watches.lock().unwrap().pop_front() {
            Some(batch) => stream::iter(batch).boxed(),
            None => stream::pending().boxed(),
        }
    }
}

// ============================================================================
// Secret store
// ============================================================================

#[derive(Debug, Default)]
pub struct FakeSecretStore {
    secrets: Mutex<BTreeMap<(String, String), ManagedSecret>>,
}

impl FakeSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, secret: ManagedSecret) {
        self.secrets
            .lock()
            .unwrap()
            .insert((secret.namespace.clone(), secret.name.clone()), secret);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<ManagedSecret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedSecret>, SecretStoreError> {
        Ok(self.secret(namespace, name))
    }

    async fn read_key(&self, key_ref: &SecretKeyRef) -> Result<Option<String>, SecretStoreError> {
        Ok(self
            .secret(&key_ref.namespace, &key_ref.name)
            .and_then(|s| s.data.get(&key_ref.key).cloned()))
    }

    async fn create(&self, secret: &ManagedSecret) -> Result<(), SecretStoreError> {
        self.put(secret.clone());
        Ok(())
    }

    async fn replace(&self, secret: &ManagedSecret) -> Result<(), SecretStoreError> {
        self.put(secret.clone());
        Ok(())
    }

    async fn list_annotated(
        &self,
        annotation: &str,
    ) -> Result<Vec<ManagedSecret>, SecretStoreError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.annotations.contains_key(annotation))
            .cloned()
            .collect())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), SecretStoreError> {
        self.secrets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub identity: Arc<FakeIdentity>,
    pub secrets: Arc<FakeSecretStore>,
    pub store: Arc<MemoryStore>,
    pub updater: CrUpdater,
}

impl Harness {
    pub fn new() -> Self {
        let transport = Arc::new(FakeTransport::new());
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn SharedStore> = Arc::<MemoryStore>::clone(&store);
        let hashes = Arc::new(HashStore::new(shared));
        let cr_transport: Arc<dyn CrTransport> = Arc::<FakeTransport>::clone(&transport);
        Self {
            updater: CrUpdater::new(cr_transport, hashes),
            transport,
            identity: Arc::new(FakeIdentity::new()),
            secrets: Arc::new(FakeSecretStore::new()),
            store,
        }
    }

    pub fn claim_reconciler<S: ManagedSpec>(&self) -> ClaimReconciler<S> {
        ClaimReconciler::new(
            Arc::<FakeIdentity>::clone(&self.identity),
            Arc::<FakeSecretStore>::clone(&self.secrets),
            self.updater.clone(),
        )
    }

    pub fn credential_reconciler(&self) -> CredentialReconciler {
        CredentialReconciler::new(
            Arc::<FakeIdentity>::clone(&self.identity),
            Arc::<FakeSecretStore>::clone(&self.secrets),
            self.updater.clone(),
        )
    }

    /// Store a custom resource of `kind` and return it with its selector.
    pub fn cr(
        &self,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
        spec: Value,
    ) -> (Value, Selector) {
        let mut metadata = json!({ "name": name, "uid": format!("uid-{name}") });
        if let Some(namespace) = namespace {
            metadata["namespace"] = json!(namespace);
        }
        let object = json!({
            "apiVersion": kind.api_version(),
            "kind": kind.kind,
            "metadata": metadata,
            "spec": spec,
        });
        let selector = self.transport.insert(kind, object.clone());
        (object, selector)
    }
}

