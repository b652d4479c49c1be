//! Error taxonomy for the attribute engine.
//!
//! Per-field errors (`ValidationError`, `CallbackError`) are local and
//! non-fatal to the form; `RegistryError` is an integration error and fails
//! the offending registration call outright. Everything is serialisable so
//! the console can carry errors across its own boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A per-field validation failure, surfaced inline next to the field. Does
/// not abort collection of other fields. The first payload is always the
/// descriptor name the error belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Error, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationError {
    #[error("attribute {0} is required but has no value")]
    Required(String),
    #[error("attribute {0}: {1:?} is not a valid integer")]
    InvalidInteger(String, String),
    #[error("attribute {0}: {1:?} is not a valid float")]
    InvalidFloat(String, String),
    #[error("attribute {0}: {1:?} is not a valid date")]
    InvalidDate(String, String),
    #[error("attribute {0}: {1:?} is not a valid datetime")]
    InvalidDateTime(String, String),
    #[error("attribute {0}: file content is not valid base64")]
    InvalidFileContent(String),
    #[error("attribute {0}: value does not match pattern {1:?}")]
    ConstraintViolation(String, String),
    #[error("attribute {0}: a structured reference value is required")]
    ReferenceRequired(String),
    #[error("attribute {0}: a boolean value is required")]
    BooleanRequired(String),
    #[error("attribute {0}: a single value is required")]
    SingleValueExpected(String),
    #[error("attribute {0}: value does not fit the declared content type")]
    ValueTypeMismatch(String),
}

/// A callback resolution failure. The affected descriptor keeps its
/// last-known content; sibling descriptors are unaffected.
#[derive(Serialize, Deserialize, Debug, Clone, Error, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallbackError {
    #[error("callback invoker rejected the call: {0}")]
    Invoker(String),
    #[error("callback returned an unexpected shape: {0}")]
    UnexpectedShape(String),
    #[error("callback cascade exceeded the configured depth limit")]
    CascadeDepthExceeded,
}

/// A programming/integration error in registry usage. Fail fast - a silent
/// overwrite would corrupt unrelated form state.
#[derive(Serialize, Deserialize, Debug, Clone, Error, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryError {
    #[error("duplicate attribute name {name:?} in namespace {namespace}")]
    DuplicateName { namespace: String, name: String },
    #[error("attribute uuid {uuid} in namespace {namespace} collides with an existing descriptor")]
    UuidCollision { namespace: String, uuid: Uuid },
    #[error("namespace {0} is not registered")]
    UnknownNamespace(String),
    #[error("attribute {0} is not registered in this namespace")]
    UnknownAttribute(String),
}

/// Umbrella error for engine operations that can fail in more than one way.
#[derive(Serialize, Deserialize, Debug, Clone, Error, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineError {
    #[error("one or more attribute values failed validation")]
    Validation(Vec<ValidationError>),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
