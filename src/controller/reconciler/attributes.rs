//! # Controller Attributes
//!
//! The attribute bag on identity-service objects is the operator's only durable side
//! channel there. The operator reserves a closed set of keys under
//! [`ATTRIBUTE_PREFIX`]; everything else in the bag belongs to someone else and is
//! carried through untouched.
//!
//! Merges are explicit and ordered: defaults, then foreign/current attributes, then the
//! reserved keys last so they always win.

use crate::constants::{
    ATTRIBUTE_PREFIX, CLAIM_ATTRIBUTE_KEY, CLAIM_ATTRIBUTE_VALUE, FINGERPRINT_ANNOTATION_KEY,
    SPEC_SNAPSHOT_ATTRIBUTE_KEY,
};
use crate::identity::{attribute_text, AttributePatch, Attributes};
use serde_json::Value;

/// Keys the operator owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKey {
    /// Ownership marker
    Claim,
    /// JSON of the last applied spec
    SpecSnapshot,
    /// Spec fingerprint (CR annotation only, never written to the identity service)
    Fingerprint,
}

impl ReservedKey {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Claim => CLAIM_ATTRIBUTE_KEY,
            Self::SpecSnapshot => SPEC_SNAPSHOT_ATTRIBUTE_KEY,
            Self::Fingerprint => FINGERPRINT_ANNOTATION_KEY,
        }
    }
}

/// Expected claim key/value pairs.
#[must_use]
pub fn claim_attributes() -> Attributes {
    Attributes::from([(
        ReservedKey::Claim.key().to_string(),
        Value::String(CLAIM_ATTRIBUTE_VALUE.to_string()),
    )])
}

/// Text of a reserved key, whichever wire shape it arrived in.
#[must_use]
pub fn reserved_value(attributes: &Attributes, key: ReservedKey) -> Option<String> {
    attributes.get(key.key()).and_then(attribute_text)
}

/// Claimed iff every expected claim pair is present with exactly the expected value.
#[must_use]
pub fn is_claimed(attributes: &Attributes) -> bool {
    claim_attributes().iter().all(|(key, expected)| {
        attributes.get(key).and_then(attribute_text).as_deref() == expected.as_str()
    })
}

/// Whether `key` lives in the operator's attribute namespace.
#[must_use]
pub fn is_controller_key(key: &str) -> bool {
    key.strip_prefix(ATTRIBUTE_PREFIX)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// `defaults ∪ current ∪ claim ∪ snapshot`, later layers winning.
#[must_use]
pub fn merge_attributes(defaults: &Attributes, current: &Attributes, snapshot: &str) -> Attributes {
    let mut merged = defaults.clone();
    merged.extend(current.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(claim_attributes());
    merged.insert(
        ReservedKey::SpecSnapshot.key().to_string(),
        Value::String(snapshot.to_string()),
    );
    merged
}

/// Attributes of a freshly created object.
#[must_use]
pub fn creation_attributes(defaults: &Attributes, snapshot: &str) -> Attributes {
    merge_attributes(defaults, &Attributes::new(), snapshot)
}

/// Current attributes plus the claim marker, for adopting in place.
#[must_use]
pub fn adoption_attributes(current: &Attributes) -> Attributes {
    let mut adopted = current.clone();
    adopted.extend(claim_attributes());
    adopted
}

/// Patch that keeps foreign attributes and removes every operator attribute.
#[must_use]
pub fn disown_patch(current: &Attributes) -> AttributePatch {
    current
        .iter()
        .map(|(key, value)| {
            if is_controller_key(key) {
                (key.clone(), None)
            } else {
                (key.clone(), Some(value.clone()))
            }
        })
        .collect()
}
