//! Keycloak Admin REST Client
//!
//! Native REST implementation of [`IdentityApi`] against the Keycloak admin API.
//!
//! - Authenticates with the password grant against `/realms/{adminRealm}`
//! - Refreshes the access token shortly before it expires, falling back to a fresh
//!   password grant when the refresh token is rejected
//! - Pages through users, groups and clients
//!
//! The token is shared behind an `RwLock` and checked before every call. Two
//! concurrent callers may both refresh; the second write simply wins.
//!
//! References:
//! - [Keycloak Admin REST API](https://www.keycloak.org/docs-api/latest/rest-api/index.html)

use super::{IdentityApi, Representation, ResourceType, Scope, ScopeBinding};
use crate::config::ControllerConfig;
use crate::constants::{KEYCLOAK_PAGE_SIZE, TOKEN_REFRESH_MARGIN_SECS};
use crate::error::IdentityError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{header::LOCATION, Client, Method, Response, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Connection settings for [`KeycloakAdminClient`]
#[derive(Clone)]
pub struct KeycloakSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub admin_realm: String,
    pub admin_client_id: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for KeycloakSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("admin_realm", &self.admin_realm)
            .field("admin_client_id", &self.admin_client_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl From<&ControllerConfig> for KeycloakSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            base_url: config.keycloak_url.clone(),
            username: config.keycloak_username.clone(),
            password: config.keycloak_password.clone(),
            admin_realm: config.keycloak_admin_realm.clone(),
            admin_client_id: config.keycloak_admin_client_id.clone(),
            timeout: config.keycloak_request_timeout(),
        }
    }
}

// ============================================================================
// Token handling
// ============================================================================

/// Response of the OpenID Connect token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh_expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct Token {
    access_token: String,
    expires_at: DateTime<Utc>,
    refresh_margin: ChronoDuration,
    refresh_token: Option<String>,
    refresh_expires_at: Option<DateTime<Utc>>,
}

impl Token {
    fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = response.expires_in.max(0);
        let margin = TOKEN_REFRESH_MARGIN_SECS.min(lifetime / 2);
        // refresh_expires_in of 0 marks an offline token without its own expiry
        let refresh_expires_at = match response.refresh_expires_in {
            Some(secs) if secs > 0 => Some(now + ChronoDuration::seconds(secs)),
            _ => None,
        };
        Self {
            access_token: response.access_token,
            expires_at: now + ChronoDuration::seconds(lifetime),
            refresh_margin: ChronoDuration::seconds(margin),
            refresh_token: response.refresh_token,
            refresh_expires_at,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + self.refresh_margin < self.expires_at
    }

    fn usable_refresh_token(&self, now: DateTime<Utc>) -> Option<String> {
        let token = self.refresh_token.as_ref()?;
        match self.refresh_expires_at {
            Some(expiry) if expiry <= now => None,
            _ => Some(token.clone()),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Keycloak admin REST client
pub struct KeycloakAdminClient {
    http_client: Client,
    base_url: Url,
    settings: KeycloakSettings,
    token: RwLock<Option<Token>>,
}

impl std::fmt::Debug for KeycloakAdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakAdminClient")
            .field("base_url", &self.base_url.as_str())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl KeycloakAdminClient {
    pub fn new(settings: KeycloakSettings) -> Result<Self, IdentityError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| IdentityError::Url(format!("{}: {e}", settings.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(IdentityError::Url(settings.base_url.clone()));
        }
        let http_client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
            settings,
            token: RwLock::new(None),
        })
    }

    /// Build a URL below the configured base from raw path segments
    fn url(&self, segments: &[&str]) -> Result<Url, IdentityError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| IdentityError::Url(self.settings.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn collection_url(&self, resource: ResourceType, scope: &Scope) -> Result<Url, IdentityError> {
        match (resource, scope) {
            (ResourceType::Realm, Scope::Root) => self.url(&["admin", "realms"]),
            (ResourceType::Realm, Scope::Realm(realm)) => Err(IdentityError::Url(format!(
                "realms cannot be nested in realm {realm}"
            ))),
            (_, Scope::Root) => Err(IdentityError::Url(format!(
                "{resource} must live inside a realm"
            ))),
            (_, Scope::Realm(realm)) => {
                self.url(&["admin", "realms", realm, resource.path_segment()])
            }
        }
    }

    fn item_url(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
    ) -> Result<Url, IdentityError> {
        let mut url = self.collection_url(resource, scope)?;
        url.path_segments_mut()
            .map_err(|()| IdentityError::Url(self.settings.base_url.clone()))?
            .push(key);
        Ok(url)
    }

    fn binding_url(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
    ) -> Result<Url, IdentityError> {
        self.url(&[
            "admin",
            "realms",
            realm,
            "clients",
            client_key,
            binding.path_segment(),
        ])
    }

    /// Return a valid access token, refreshing or re-authenticating when needed
    async fn ensure_authed(&self) -> Result<String, IdentityError> {
        let now = Utc::now();
        let refresh_token = {
            let guard = self.token.read().await;
            match guard.as_ref() {
                Some(token) if token.is_fresh(now) => return Ok(token.access_token.clone()),
                Some(token) => token.usable_refresh_token(now),
                None => None,
            }
        };

        let token = match refresh_token {
            Some(refresh_token) => match self.refresh_grant(&refresh_token).await {
                Ok(token) => token,
                Err(e) => {
                    debug!("Token refresh failed, falling back to password grant: {}", e);
                    self.password_grant().await?
                }
            },
            None => self.password_grant().await?,
        };

        let access_token = token.access_token.clone();
        *self.token.write().await = Some(token);
        Ok(access_token)
    }

    async fn password_grant(&self) -> Result<Token, IdentityError> {
        debug!(
            "Authenticating against Keycloak realm {} as {}",
            self.settings.admin_realm, self.settings.username
        );
        self.token_request(&[
            ("grant_type", "password"),
            ("client_id", self.settings.admin_client_id.as_str()),
            ("username", self.settings.username.as_str()),
            ("password", self.settings.password.as_str()),
        ])
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Token, IdentityError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.settings.admin_client_id.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Token, IdentityError> {
        let url = self.url(&[
            "realms",
            &self.settings.admin_realm,
            "protocol",
            "openid-connect",
            "token",
        ])?;
        let response = self.http_client.post(url).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::Auth(format!("{status}: {body}")));
        }
        let token: TokenResponse = response.json().await?;
        Ok(Token::from_response(token, Utc::now()))
    }

    /// Send an authenticated request and turn non-2xx answers into errors
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Response, IdentityError> {
        let token = self.ensure_authed().await?;
        let mut request = self
            .http_client
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IdentityError::Status {
            method: method.to_string(),
            path: url.path().to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn get_list(&self, url: Url) -> Result<Vec<Representation>, IdentityError> {
        let items: Vec<Value> = self.send(Method::GET, url, None).await?.json().await?;
        Ok(items
            .into_iter()
            .filter_map(Representation::from_value)
            .collect())
    }

    /// Fetch every page of a paginated collection
    async fn get_paged(&self, url: Url) -> Result<Vec<Representation>, IdentityError> {
        let mut items = Vec::new();
        let mut first = 0usize;
        loop {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("first", &first.to_string())
                .append_pair("max", &KEYCLOAK_PAGE_SIZE.to_string());
            let page = self.get_list(page_url).await?;
            let len = page.len();
            items.extend(page);
            if len < KEYCLOAK_PAGE_SIZE {
                return Ok(items);
            }
            first += len;
        }
    }
}

/// Query parameters narrowing a listing to the lookup fields
fn filter_query(resource: ResourceType, filter: &Representation) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    match resource {
        ResourceType::Client => {
            if let Some(client_id) = filter.get_str("clientId") {
                query.push(("clientId", client_id.to_string()));
            }
        }
        ResourceType::User => {
            query.push(("briefRepresentation", "false".to_string()));
            if let Some(username) = filter.get_str("username") {
                query.push(("username", username.to_string()));
                query.push(("exact", "true".to_string()));
            }
        }
        ResourceType::Group => {
            query.push(("briefRepresentation", "false".to_string()));
            if let Some(name) = filter.get_str("name") {
                query.push(("search", name.to_string()));
                query.push(("exact", "true".to_string()));
            }
        }
        ResourceType::Realm | ResourceType::ClientScope => {}
    }
    query
}

/// Convert the attribute bag to the wire shape of `resource`.
///
/// Users and groups take lists and replace the whole map on update, so a removal is
/// expressed by leaving the key out. Other types take strings and drop keys sent as `null`.
fn encode_body(resource: ResourceType, body: &Representation) -> Value {
    let mut value = body.clone().into_value();
    if !resource.multivalued_attributes() {
        return value;
    }
    if let Some(Value::Object(attributes)) = value.get_mut("attributes") {
        let encoded = attributes
            .iter()
            .filter_map(|(key, v)| match v {
                Value::Null => None,
                Value::Array(_) => Some((key.clone(), v.clone())),
                other => Some((key.clone(), Value::Array(vec![other.clone()]))),
            })
            .collect();
        *attributes = encoded;
    }
    value
}

fn id_from_location(response: &Response) -> Option<String> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    let trimmed = location.trim_end_matches('/');
    let id = trimmed.rsplit('/').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

fn not_found_as_none<T>(result: Result<T, IdentityError>) -> Result<Option<T>, IdentityError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl IdentityApi for KeycloakAdminClient {
    async fn find(
        &self,
        resource: ResourceType,
        scope: &Scope,
        filter: &Representation,
    ) -> Result<Vec<Representation>, IdentityError> {
        let mut url = self.collection_url(resource, scope)?;
        {
            let query = filter_query(resource, filter);
            if !query.is_empty() {
                url.query_pairs_mut().extend_pairs(query);
            }
        }
        match resource {
            ResourceType::Client | ResourceType::Group | ResourceType::User => {
                self.get_paged(url).await
            }
            ResourceType::Realm | ResourceType::ClientScope => self.get_list(url).await,
        }
    }

    async fn find_one(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<Representation>, IdentityError> {
        let url = self.item_url(resource, scope, key)?;
        let response = not_found_as_none(self.send(Method::GET, url, None).await)?;
        match response {
            Some(response) => {
                let value: Value = response.json().await?;
                Ok(Representation::from_value(value))
            }
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        resource: ResourceType,
        scope: &Scope,
        body: &Representation,
    ) -> Result<String, IdentityError> {
        let url = self.collection_url(resource, scope)?;
        let path = url.path().to_string();
        let response = self
            .send(Method::POST, url, Some(&encode_body(resource, body)))
            .await?;
        if resource == ResourceType::Realm {
            return resource
                .key_of(body)
                .ok_or(IdentityError::MissingId(path));
        }
        id_from_location(&response).ok_or(IdentityError::MissingId(path))
    }

    async fn update(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
        body: &Representation,
    ) -> Result<(), IdentityError> {
        let url = self.item_url(resource, scope, key)?;
        self.send(Method::PUT, url, Some(&encode_body(resource, body)))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        resource: ResourceType,
        scope: &Scope,
        key: &str,
    ) -> Result<(), IdentityError> {
        let url = self.item_url(resource, scope, key)?;
        if not_found_as_none(self.send(Method::DELETE, url, None).await)?.is_none() {
            debug!("{} {} in {} was already gone", resource, key, scope);
        }
        Ok(())
    }

    async fn list_scope_bindings(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
    ) -> Result<Vec<Representation>, IdentityError> {
        let url = self.binding_url(realm, client_key, binding)?;
        self.get_list(url).await
    }

    async fn add_scope_binding(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
        scope_key: &str,
    ) -> Result<(), IdentityError> {
        let mut url = self.binding_url(realm, client_key, binding)?;
        url.path_segments_mut()
            .map_err(|()| IdentityError::Url(self.settings.base_url.clone()))?
            .push(scope_key);
        self.send(Method::PUT, url, None).await?;
        Ok(())
    }

    async fn remove_scope_binding(
        &self,
        realm: &str,
        client_key: &str,
        binding: ScopeBinding,
        scope_key: &str,
    ) -> Result<(), IdentityError> {
        let mut url = self.binding_url(realm, client_key, binding)?;
        url.path_segments_mut()
            .map_err(|()| IdentityError::Url(self.settings.base_url.clone()))?
            .push(scope_key);
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn client_secret(
        &self,
        realm: &str,
        client_key: &str,
    ) -> Result<Option<String>, IdentityError> {
        let url = self.url(&[
            "admin",
            "realms",
            realm,
            "clients",
            client_key,
            "client-secret",
        ])?;
        let Some(response) = not_found_as_none(self.send(Method::GET, url, None).await)? else {
            return Ok(None);
        };
        let credential: Value = response.json().await?;
        Ok(credential
            .get("value")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn partial_import(&self, realm: &str, body: &Value) -> Result<(), IdentityError> {
        let url = self.url(&["admin", "realms", realm, "partialImport"])?;
        match self.send(Method::POST, url, Some(body)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!("Partial import target realm {} not found", realm);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
