//! The dynamic attribute engine.
//!
//! Console forms in the platform are not compiled against a fixed schema: the
//! backend supplies a list of attribute descriptors per connector, authority,
//! profile or token, and the form is rendered from them. This crate is the
//! reactive core behind those forms. It owns the descriptor registry for a
//! form instance, derives stable field keys, resolves inter-field
//! dependencies through asynchronous callback lookups, merges dynamically
//! discovered descriptors, and rebuilds the typed payload the backend
//! expects on submit.
//!
//! The engine is a pure library: it consumes an injected
//! [`CallbackInvoker`](crate::engine::CallbackInvoker) and initial descriptor
//! lists, and exposes collected attributes. It performs no I/O of its own.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

pub mod binding;
pub mod collect;
pub mod engine;
pub mod groups;
pub mod registry;
pub mod resolver;
pub mod testkit;
pub mod value;

/// A prelude of imports that should be imported by all other modules of the
/// engine and by embedding console code.
pub mod prelude {
    pub use uuid::Uuid;

    pub use dynattr_proto::attribute::{
        AttributeConstraint, AttributeContent, AttributeContentType, AttributeDescriptor,
        AttributeProperties, CollectedAttribute, ScalarValue,
    };
    pub use dynattr_proto::callback::{
        AttributeCallback, CallbackMapping, CallbackRequest, CallbackResponse, CallbackTarget,
    };
    pub use dynattr_proto::error::{CallbackError, EngineError, RegistryError, ValidationError};

    pub use crate::binding::{FieldBindings, NamespaceKey};
    pub use crate::engine::{CallbackInvoker, FormEngine, ResolveLimits};
    pub use crate::registry::DescriptorRegistry;
    pub use crate::resolver::{ResolutionState, ResolveOutcome};
    pub use crate::value::FieldValue;
}
