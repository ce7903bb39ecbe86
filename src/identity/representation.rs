//! # Representation
//!
//! Loosely typed identity-service object. Keycloak representations are wide and
//! version dependent, so the operator only interprets the handful of fields it needs
//! (`id`, lookup keys, `attributes`) and passes the rest through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute bag of an identity-service object, values kept in their wire shape.
///
/// Users and groups carry `list<string>` values, every other type plain strings. The
/// operator only ever reads its own keys as text; everything else passes through as is.
pub type Attributes = BTreeMap<String, Value>;

/// Attribute update where `None` removes the key.
pub type AttributePatch = BTreeMap<String, Option<Value>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Representation(Map<String, Value>);

impl Representation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, keeping only objects.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Build from string fields, skipping unset ones.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut rep = Self::new();
        for (key, value) in fields {
            if let Some(value) = value {
                rep.insert(key, Value::String(value.to_string()));
            }
        }
        rep
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Overlay every field of `other` onto `self`; `other` wins.
    pub fn overlay(&mut self, other: &Representation) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Exact match on every field of `lookup`.
    #[must_use]
    pub fn matches(&self, lookup: &Representation) -> bool {
        lookup
            .0
            .iter()
            .all(|(key, expected)| self.0.get(key) == Some(expected))
    }

    /// The subset of fields named by `keys`.
    #[must_use]
    pub fn project(&self, keys: &[&str]) -> Representation {
        let mut projected = Representation::new();
        for key in keys {
            if let Some(value) = self.0.get(*key) {
                projected.insert(*key, value.clone());
            }
        }
        projected
    }

    /// Attribute bag as stored, without `null` entries.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        let Some(Value::Object(raw)) = self.0.get("attributes") else {
            return Attributes::new();
        };
        raw.iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Text of one attribute, see [`attribute_text`].
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        match self.0.get("attributes") {
            Some(Value::Object(raw)) => raw.get(key).and_then(attribute_text),
            _ => None,
        }
    }

    pub fn set_attributes(&mut self, attributes: &Attributes) {
        let map: Map<String, Value> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.0.insert("attributes".to_string(), Value::Object(map));
    }

    pub fn set_attribute_patch(&mut self, patch: &AttributePatch) {
        let map: Map<String, Value> = patch
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().unwrap_or(Value::Null)))
            .collect();
        self.0.insert("attributes".to_string(), Value::Object(map));
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Representation {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Single-string reading of an attribute value.
///
/// A list stands for its first element. Booleans and numbers are rendered as their
/// JSON text.
#[must_use]
pub fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.first().and_then(attribute_text),
        Value::Null | Value::Object(_) => None,
    }
}
