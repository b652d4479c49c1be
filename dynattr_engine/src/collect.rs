//! The value collector: walks a namespace's descriptors in registry order
//! and rebuilds the backend request shape from the live form values.
//!
//! The backend distinguishes "not set" from "set to empty", so optional
//! descriptors with no value are omitted entirely rather than emitted with
//! empty content. Validation failures do not abort the pass - every bad
//! field of one submit attempt is reported together.

use crate::binding::{FieldBindings, NamespaceKey};
use crate::prelude::*;
use crate::value;

/// Collect the submission payload for one namespace. Never fails on data
/// shape or absence; fails only on validation (required-but-empty, type
/// coercion) so the caller can block submission.
pub fn collect(
    ns: &NamespaceKey,
    descriptors: &[AttributeDescriptor],
    bindings: &FieldBindings,
) -> Result<Vec<CollectedAttribute>, EngineError> {
    let mut collected = Vec::with_capacity(descriptors.len());
    let mut errors = Vec::new();

    for d in descriptors {
        let key = FieldBindings::key_for(ns, &d.name);
        let current = bindings.value_of(&key);

        if current.is_empty() {
            // Read-only descriptors render disabled but still submit their
            // server-supplied content.
            if d.properties.read_only && !d.content.is_empty() {
                collected.push(CollectedAttribute::new(d.uuid, d.content.clone()));
                continue;
            }
            if d.properties.required {
                errors.push(ValidationError::Required(d.name.clone()));
            }
            // Absent and never-rendered descriptors fall through silently.
            continue;
        }

        match value::coerce(d, current) {
            Ok(content) if content.is_empty() => {
                if d.properties.required {
                    errors.push(ValidationError::Required(d.name.clone()));
                }
            }
            Ok(content) => collected.push(CollectedAttribute::new(d.uuid, content)),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        trace!(namespace = %ns, count = collected.len(), "collected attributes");
        Ok(collected)
    } else {
        debug!(namespace = %ns, failures = errors.len(), "collection failed validation");
        Err(EngineError::Validation(errors))
    }
}
