//! The field binding layer: stable namespaced field keys and the live form
//! value store.
//!
//! A binding exists exactly as long as its descriptor is registered. When a
//! descriptor (or a whole namespace) is removed, the bound value is cleared
//! as well, so a stale value can never be submitted for a selection context
//! that no longer exists.

use std::fmt;

use hashbrown::HashMap;

use crate::value::FieldValue;

const UNSET: FieldValue = FieldValue::Unset;

/// Identifies one descriptor set within a form instance: the kind of owning
/// resource ("connector", "authority", ...) plus the concrete resource id.
/// Rendered as `kind:resource`, which prefixes every derived field key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespaceKey {
    kind: String,
    resource: String,
}

impl NamespaceKey {
    pub fn new(kind: &str, resource: &str) -> Self {
        NamespaceKey {
            kind: kind.to_string(),
            resource: resource.to_string(),
        }
    }

    /// The prefix shared by every field key in this namespace, including the
    /// trailing separator.
    pub fn prefix(&self) -> String {
        format!("{}:{}:", self.kind, self.resource)
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.resource)
    }
}

/// The live form state: field key to current value.
#[derive(Debug, Default)]
pub struct FieldBindings {
    values: HashMap<String, FieldValue>,
}

impl FieldBindings {
    pub fn new() -> Self {
        FieldBindings {
            values: HashMap::new(),
        }
    }

    /// Derive the stable field key for a descriptor name in a namespace.
    pub fn key_for(ns: &NamespaceKey, name: &str) -> String {
        format!("{}{}", ns.prefix(), name)
    }

    pub fn value_of(&self, key: &str) -> &FieldValue {
        self.values.get(key).unwrap_or(&UNSET)
    }

    pub fn set(&mut self, key: String, value: FieldValue) {
        if matches!(value, FieldValue::Unset) {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
    }

    /// Reset a field to its descriptor default. `Unset` defaults simply drop
    /// the entry.
    pub fn clear(&mut self, key: &str, default: FieldValue) {
        match default {
            FieldValue::Unset => {
                self.values.remove(key);
            }
            other => {
                self.values.insert(key.to_string(), other);
            }
        }
    }

    /// Destroy the binding entirely - used when the descriptor itself is
    /// removed from the registry.
    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// Clear every field bound under keys with the given prefix. This is the
    /// "attribute family" rule: after an upstream selector change, no field
    /// of the dependent family may retain its old value.
    pub fn clear_family(&mut self, prefix: &str) -> usize {
        let before = self.values.len();
        self.values.retain(|k, _| !k.starts_with(prefix));
        let cleared = before - self.values.len();
        if cleared > 0 {
            trace!(%prefix, cleared, "cleared field family");
        }
        cleared
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}
