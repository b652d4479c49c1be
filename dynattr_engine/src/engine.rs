//! The per-form engine context.
//!
//! A [`FormEngine`] owns the registry, bindings and resolver state for one
//! form instance, behind a cheap clonable handle. It is never a process-wide
//! singleton: nested forms (a modal creating a dependency while its parent
//! form is open) each get their own engine and cannot interfere.
//!
//! Locking discipline: the state mutex is only ever held for synchronous
//! bookkeeping. Invoker calls run with the lock released, and their results
//! are applied under a fresh lock where stale tokens and closed forms are
//! checked before anything is touched.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::binding::{FieldBindings, NamespaceKey};
use crate::collect;
use crate::groups;
use crate::prelude::*;
use crate::resolver::{self, RequestBuild, ResolverState};

/// The injected capability that reaches the backend. The surrounding
/// application supplies this; the engine never performs I/O itself. Timeout
/// and retry policy belong to the implementation - the engine only handles
/// eventual success, failure, or supersession.
#[async_trait]
pub trait CallbackInvoker: Send + Sync {
    async fn invoke(&self, request: CallbackRequest) -> Result<CallbackResponse, CallbackError>;
}

/// Operation limits for one engine. Server-supplied mapping graphs may be
/// accidentally cyclic; a resolution wave deeper than this fails instead of
/// spinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveLimits {
    pub max_cascade_depth: usize,
}

impl Default for ResolveLimits {
    fn default() -> Self {
        ResolveLimits {
            max_cascade_depth: 32,
        }
    }
}

struct FormState {
    registry: DescriptorRegistry,
    bindings: FieldBindings,
    resolver: ResolverState,
    closed: bool,
}

/// Handle to one form instance's attribute engine.
#[derive(Clone)]
pub struct FormEngine {
    state: Arc<Mutex<FormState>>,
    invoker: Arc<dyn CallbackInvoker>,
    limits: ResolveLimits,
}

impl FormEngine {
    pub fn new(invoker: Arc<dyn CallbackInvoker>) -> Self {
        Self::with_limits(invoker, ResolveLimits::default())
    }

    pub fn with_limits(invoker: Arc<dyn CallbackInvoker>, limits: ResolveLimits) -> Self {
        FormEngine {
            state: Arc::new(Mutex::new(FormState {
                registry: DescriptorRegistry::new(),
                bindings: FieldBindings::new(),
                resolver: ResolverState::default(),
                closed: false,
            })),
            invoker,
            limits,
        }
    }

    /// Replace the descriptor set for a namespace. Bindings of descriptors
    /// that do not survive the replacement are destroyed.
    #[instrument(level = "debug", skip_all, fields(namespace = %ns))]
    pub async fn register(
        &self,
        ns: &NamespaceKey,
        descriptors: Vec<AttributeDescriptor>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        let delta = state.registry.register(ns, descriptors)?;
        for (uuid, name) in &delta.removed {
            state.bindings.remove(&FieldBindings::key_for(ns, name));
            state.resolver.forget(*uuid);
        }
        Ok(())
    }

    /// Remove a namespace and clear its whole field family.
    #[instrument(level = "debug", skip_all, fields(namespace = %ns))]
    pub async fn clear(&self, ns: &NamespaceKey) {
        let mut state = self.state.lock().await;
        let uuids: Vec<Uuid> = state
            .registry
            .descriptors(ns)
            .map(|ds| ds.iter().map(|d| d.uuid).collect())
            .unwrap_or_default();
        state.registry.clear(ns);
        for uuid in uuids {
            state.resolver.forget(uuid);
        }
        state.bindings.clear_family(&ns.prefix());
    }

    /// Snapshot of a namespace's descriptors in registry order, as the form
    /// renderer consumes them.
    pub async fn descriptors(&self, ns: &NamespaceKey) -> Vec<AttributeDescriptor> {
        let state = self.state.lock().await;
        state
            .registry
            .descriptors(ns)
            .map(|ds| ds.to_vec())
            .unwrap_or_default()
    }

    pub async fn descriptor(
        &self,
        ns: &NamespaceKey,
        name: &str,
    ) -> Option<AttributeDescriptor> {
        let state = self.state.lock().await;
        state.registry.descriptor_by_name(ns, name).cloned()
    }

    pub async fn value_of(&self, ns: &NamespaceKey, name: &str) -> FieldValue {
        let state = self.state.lock().await;
        state
            .bindings
            .value_of(&FieldBindings::key_for(ns, name))
            .clone()
    }

    /// The resolver state of one descriptor, for busy/error display.
    pub async fn resolution_state(&self, uuid: Uuid) -> ResolutionState {
        let state = self.state.lock().await;
        state.resolver.state_of(uuid)
    }

    /// Commit a field edit, then re-resolve every descriptor whose callback
    /// depends on it, cascading through multi-level chains.
    #[instrument(level = "debug", skip_all, fields(namespace = %ns, field = %name))]
    pub async fn set_value(
        &self,
        ns: &NamespaceKey,
        name: &str,
        value: FieldValue,
    ) -> Result<Vec<ResolveOutcome>, EngineError> {
        {
            let mut state = self.state.lock().await;
            if !state.registry.is_registered(ns) {
                return Err(RegistryError::UnknownNamespace(ns.to_string()).into());
            }
            if state.registry.descriptor_by_name(ns, name).is_none() {
                return Err(RegistryError::UnknownAttribute(name.to_string()).into());
            }
            state
                .bindings
                .set(FieldBindings::key_for(ns, name), value);
        }
        self.resolve_wave(ns, vec![name.to_string()], Vec::new())
            .await
    }

    /// Reset a field to its descriptor default (the first pre-populated
    /// content item, or unset), then re-resolve its dependents like any
    /// other committed edit.
    #[instrument(level = "debug", skip_all, fields(namespace = %ns, field = %name))]
    pub async fn clear_value(
        &self,
        ns: &NamespaceKey,
        name: &str,
    ) -> Result<Vec<ResolveOutcome>, EngineError> {
        {
            let mut state = self.state.lock().await;
            let default = state
                .registry
                .descriptor_by_name(ns, name)
                .map(FieldValue::default_for)
                .ok_or_else(|| RegistryError::UnknownAttribute(name.to_string()))?;
            state
                .bindings
                .clear(&FieldBindings::key_for(ns, name), default);
        }
        self.resolve_wave(ns, vec![name.to_string()], Vec::new())
            .await
    }

    /// Resolve every callback descriptor whose request is already buildable
    /// (static mappings, defaults). Called by the console once after the
    /// initial registration.
    #[instrument(level = "debug", skip_all, fields(namespace = %ns))]
    pub async fn resolve_initial(
        &self,
        ns: &NamespaceKey,
    ) -> Result<Vec<ResolveOutcome>, EngineError> {
        let seeds = {
            let state = self.state.lock().await;
            state.registry.callback_descriptors(ns)
        };
        self.resolve_wave(ns, Vec::new(), seeds).await
    }

    /// Merge externally supplied group descriptors beneath a parent. The
    /// resolver performs this itself for descriptor-shaped callback
    /// responses; this entry point exists for console code that fetches
    /// group attributes out of band.
    pub async fn merge_group_attributes(
        &self,
        ns: &NamespaceKey,
        parent: Uuid,
        incoming: Vec<AttributeDescriptor>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        let st = &mut *state;
        groups::merge_group_attributes(
            &mut st.registry,
            &mut st.bindings,
            &mut st.resolver,
            ns,
            parent,
            incoming,
        )
        .map(|_| ())
    }

    /// Build the submission payload for a namespace.
    #[instrument(level = "debug", skip_all, fields(namespace = %ns))]
    pub async fn collect(
        &self,
        ns: &NamespaceKey,
    ) -> Result<Vec<CollectedAttribute>, EngineError> {
        let state = self.state.lock().await;
        let descriptors = state
            .registry
            .descriptors(ns)
            .ok_or_else(|| RegistryError::UnknownNamespace(ns.to_string()))?;
        collect::collect(ns, descriptors, &state.bindings)
    }

    /// Stop applying resolutions for this form instance. Called on unmount;
    /// any response still in flight is dropped when it arrives.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
    }

    /// One resolution wave: resolve the dependents of the seed fields (plus
    /// any directly seeded descriptors), apply the responses, and cascade
    /// until nothing new is triggered. Each descriptor resolves at most once
    /// per wave, which collapses diamond dependencies into a single trigger.
    async fn resolve_wave(
        &self,
        ns: &NamespaceKey,
        mut next_fields: Vec<String>,
        mut next_direct: Vec<Uuid>,
    ) -> Result<Vec<ResolveOutcome>, EngineError> {
        let mut outcomes = Vec::new();
        let mut visited: BTreeSet<Uuid> = BTreeSet::new();
        let mut depth = 0usize;

        loop {
            let mut pending: Vec<(Uuid, u64, CallbackRequest)> = Vec::new();
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Ok(outcomes);
                }

                let mut round: Vec<Uuid> = Vec::new();
                for field in next_fields.drain(..) {
                    for uuid in state.registry.dependents_of(ns, &field) {
                        if !round.contains(&uuid) {
                            round.push(uuid);
                        }
                    }
                }
                for uuid in next_direct.drain(..) {
                    if !round.contains(&uuid) {
                        round.push(uuid);
                    }
                }
                round.retain(|uuid| !visited.contains(uuid));

                for uuid in round {
                    visited.insert(uuid);
                    let build = match state.registry.descriptor_by_uuid(ns, uuid) {
                        Some(d) => resolver::build_request(ns, &state.bindings, d),
                        None => continue,
                    };
                    match build {
                        RequestBuild::Ready(request) => {
                            let token = state.resolver.issue(uuid);
                            pending.push((uuid, token, request));
                        }
                        RequestBuild::Missing => {
                            state.resolver.set_state(uuid, ResolutionState::Skipped);
                            // A parent that can no longer call out loses the
                            // group attributes it produced.
                            let st = &mut *state;
                            groups::drop_group_attributes(
                                &mut st.registry,
                                &mut st.bindings,
                                &mut st.resolver,
                                ns,
                                uuid,
                            );
                            outcomes.push(ResolveOutcome::Skipped { uuid });
                        }
                    }
                }
            }

            if pending.is_empty() {
                return Ok(outcomes);
            }

            depth += 1;
            if depth > self.limits.max_cascade_depth {
                warn!(namespace = %ns, depth, "callback cascade exceeded depth limit");
                return Err(CallbackError::CascadeDepthExceeded.into());
            }

            let results = join_all(pending.into_iter().map(|(uuid, token, request)| {
                let invoker = self.invoker.clone();
                async move {
                    let result = invoker.invoke(request).await;
                    (uuid, token, result)
                }
            }))
            .await;

            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Ok(outcomes);
                }
                for (uuid, token, result) in results {
                    let outcome = Self::apply_result(
                        &mut state,
                        ns,
                        uuid,
                        token,
                        result,
                        &mut next_fields,
                        &mut next_direct,
                    )?;
                    outcomes.push(outcome);
                }
            }

            if next_fields.is_empty() && next_direct.is_empty() {
                return Ok(outcomes);
            }
        }
    }

    /// Apply one callback result under the state lock. Only the latest
    /// issued token may touch state: responses are applied in trigger order,
    /// never completion order.
    fn apply_result(
        state: &mut FormState,
        ns: &NamespaceKey,
        uuid: Uuid,
        token: u64,
        result: Result<CallbackResponse, CallbackError>,
        next_fields: &mut Vec<String>,
        next_direct: &mut Vec<Uuid>,
    ) -> Result<ResolveOutcome, EngineError> {
        if !state.resolver.is_current(uuid, token) {
            debug!(%uuid, token, "discarding superseded callback response");
            return Ok(ResolveOutcome::Superseded { uuid });
        }
        // The descriptor may have been removed while the call was in
        // flight; its response no longer has anywhere to land.
        let name = match state.registry.descriptor_by_uuid(ns, uuid) {
            Some(d) => d.name.clone(),
            None => return Ok(ResolveOutcome::Superseded { uuid }),
        };

        match result {
            Ok(CallbackResponse::Content(items)) => {
                if state
                    .registry
                    .replace_content(ns, uuid, items.clone())
                    .is_err()
                {
                    return Ok(ResolveOutcome::Superseded { uuid });
                }
                let key = FieldBindings::key_for(ns, &name);
                let cleared =
                    match resolver::reconcile_selection(state.bindings.value_of(&key), &items) {
                        Some(v) => {
                            state.bindings.set(key, v);
                            true
                        }
                        None => false,
                    };
                state
                    .resolver
                    .set_state(uuid, ResolutionState::Resolved { token });
                next_fields.push(name);
                Ok(ResolveOutcome::Resolved { uuid, cleared })
            }
            Ok(CallbackResponse::Descriptors(descriptors)) => {
                let st = &mut *state;
                match groups::merge_group_attributes(
                    &mut st.registry,
                    &mut st.bindings,
                    &mut st.resolver,
                    ns,
                    uuid,
                    descriptors,
                ) {
                    Ok(delta) => {
                        st.resolver
                            .set_state(uuid, ResolutionState::Resolved { token });
                        // Freshly discovered descriptors may declare
                        // callbacks of their own - resolve them in the next
                        // round.
                        for added in &delta.added {
                            let has_callback = st
                                .registry
                                .descriptor_by_uuid(ns, *added)
                                .map(|d| d.callback.is_some())
                                .unwrap_or(false);
                            if has_callback {
                                next_direct.push(*added);
                            }
                        }
                        next_fields.push(name);
                        Ok(ResolveOutcome::Resolved {
                            uuid,
                            cleared: false,
                        })
                    }
                    Err(e) => {
                        // Integration error: surface on the descriptor and
                        // fail the wave - a silent overwrite would corrupt
                        // unrelated form state.
                        st.resolver.set_state(
                            uuid,
                            ResolutionState::Failed {
                                error: CallbackError::UnexpectedShape(e.to_string()),
                            },
                        );
                        Err(e.into())
                    }
                }
            }
            Err(error) => {
                warn!(namespace = %ns, attribute = %name, %error, "callback failed");
                state.resolver.set_state(
                    uuid,
                    ResolutionState::Failed {
                        error: error.clone(),
                    },
                );
                Ok(ResolveOutcome::Failed { uuid, error })
            }
        }
    }
}
