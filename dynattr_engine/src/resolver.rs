//! The callback resolver: dependency tracking state and the pure mechanics
//! of turning a descriptor's callback declaration plus the current form
//! state into an outgoing request.
//!
//! The async orchestration (issuing invoker calls, applying responses,
//! cascading) lives in [`crate::engine`]; everything here is synchronous and
//! operates on borrowed state, which is what makes the ordering rules
//! testable in isolation.

use hashbrown::HashMap;
use serde_json::Value as JsonValue;

use crate::binding::{FieldBindings, NamespaceKey};
use crate::prelude::*;

/// Lifecycle of one descriptor's callback. A new trigger while `Requesting`
/// supersedes the in-flight request: its token becomes stale and its
/// eventual response is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolutionState {
    #[default]
    Idle,
    Requesting {
        token: u64,
    },
    Resolved {
        token: u64,
    },
    Skipped,
    Failed {
        error: CallbackError,
    },
}

/// What happened to one dependent descriptor during a resolution wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The callback completed and its result was applied. `cleared` is true
    /// when the field's previous selection did not survive the new option
    /// set.
    Resolved { uuid: Uuid, cleared: bool },
    /// A mapping had neither a resolvable source nor a literal - the call
    /// was not made.
    Skipped { uuid: Uuid },
    /// The invoker failed; prior content is untouched.
    Failed { uuid: Uuid, error: CallbackError },
    /// A newer trigger took over while this one was in flight; the response
    /// was discarded.
    Superseded { uuid: Uuid },
}

impl ResolveOutcome {
    pub fn uuid(&self) -> Uuid {
        match self {
            ResolveOutcome::Resolved { uuid, .. }
            | ResolveOutcome::Skipped { uuid }
            | ResolveOutcome::Failed { uuid, .. }
            | ResolveOutcome::Superseded { uuid } => *uuid,
        }
    }
}

/// Per-descriptor resolution bookkeeping: the monotonically increasing
/// request token and the externally visible state.
#[derive(Debug, Default)]
pub(crate) struct ResolverState {
    tokens: HashMap<Uuid, u64>,
    states: HashMap<Uuid, ResolutionState>,
}

impl ResolverState {
    /// Issue the next token for a descriptor and mark it `Requesting`. Any
    /// response carrying an older token is stale from this moment on.
    pub(crate) fn issue(&mut self, uuid: Uuid) -> u64 {
        let counter = self.tokens.entry(uuid).or_insert(0);
        *counter += 1;
        let token = *counter;
        self.states
            .insert(uuid, ResolutionState::Requesting { token });
        token
    }

    /// True while `token` is still the latest issued for this descriptor.
    pub(crate) fn is_current(&self, uuid: Uuid, token: u64) -> bool {
        self.tokens.get(&uuid) == Some(&token)
    }

    pub(crate) fn set_state(&mut self, uuid: Uuid, state: ResolutionState) {
        self.states.insert(uuid, state);
    }

    pub(crate) fn state_of(&self, uuid: Uuid) -> ResolutionState {
        self.states.get(&uuid).cloned().unwrap_or_default()
    }

    /// Drop bookkeeping for a removed descriptor.
    pub(crate) fn forget(&mut self, uuid: Uuid) {
        self.tokens.remove(&uuid);
        self.states.remove(&uuid);
    }
}

/// Outcome of assembling a callback request from the current form state.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RequestBuild {
    Ready(CallbackRequest),
    /// At least one mapping is unresolvable - the callback is inert until
    /// the dependency has a value.
    Missing,
}

/// Build the outgoing request for `d`'s callback: every mapping resolves its
/// `from` field through the bindings (or falls back to its literal), and the
/// parameter is placed at each declared target.
pub(crate) fn build_request(
    ns: &NamespaceKey,
    bindings: &FieldBindings,
    d: &AttributeDescriptor,
) -> RequestBuild {
    let Some(cb) = &d.callback else {
        return RequestBuild::Missing;
    };
    let mut req = CallbackRequest::new(&cb.callback_context, &cb.callback_method);
    for mapping in &cb.mappings {
        let Some(value) = mapping_param(ns, bindings, mapping) else {
            trace!(
                attribute = %d.name,
                to = %mapping.to,
                "callback mapping unresolvable, skipping"
            );
            return RequestBuild::Missing;
        };
        for target in &mapping.targets {
            req.insert(*target, &mapping.to, value.clone());
        }
    }
    RequestBuild::Ready(req)
}

fn mapping_param(
    ns: &NamespaceKey,
    bindings: &FieldBindings,
    mapping: &CallbackMapping,
) -> Option<JsonValue> {
    if let Some(from) = &mapping.from {
        let key = FieldBindings::key_for(ns, from);
        return match bindings.value_of(&key).as_json() {
            // A present-but-uncoercible source is treated as missing, not as
            // a failure.
            Some(v) => coerce_param(mapping.attribute_type, v),
            None => mapping.value.clone(),
        };
    }
    mapping.value.clone()
}

/// Shape a source value to the content type the mapping declares for it.
fn coerce_param(ct: Option<AttributeContentType>, value: JsonValue) -> Option<JsonValue> {
    match ct {
        None => Some(value),
        Some(AttributeContentType::Integer) => match value {
            JsonValue::Number(_) => Some(value),
            JsonValue::String(s) => s.trim().parse::<i64>().ok().map(JsonValue::from),
            _ => None,
        },
        Some(AttributeContentType::Float) => match value {
            JsonValue::Number(_) => Some(value),
            JsonValue::String(s) => s.trim().parse::<f64>().ok().map(JsonValue::from),
            _ => None,
        },
        Some(AttributeContentType::Boolean) => match value {
            JsonValue::Bool(_) => Some(value),
            JsonValue::String(s) => s.trim().parse::<bool>().ok().map(JsonValue::from),
            _ => None,
        },
        Some(_) => Some(value),
    }
}

/// The stability-on-overlap rule: after a callback replaces an option set,
/// the current selection is preserved when it still appears among the new
/// options (compared by transmitted data, not label) and cleared otherwise.
/// Multi-selections keep the surviving subset, in the original selection
/// order.
///
/// Returns `None` when the field should be left untouched, `Some(v)` when it
/// must be rewritten.
pub(crate) fn reconcile_selection(
    current: &FieldValue,
    options: &[AttributeContent],
) -> Option<FieldValue> {
    let in_options = |c: &AttributeContent| options.iter().any(|o| o.data() == c.data());
    match current {
        FieldValue::Content(c) => {
            if in_options(c) {
                None
            } else {
                Some(FieldValue::Unset)
            }
        }
        FieldValue::ContentList(cs) => {
            let kept: Vec<AttributeContent> = cs.iter().filter(|c| in_options(c)).cloned().collect();
            if kept.len() == cs.len() {
                None
            } else if kept.is_empty() {
                Some(FieldValue::Unset)
            } else {
                Some(FieldValue::ContentList(kept))
            }
        }
        // Free-form values are not options; resolution never rewrites them.
        _ => None,
    }
}
