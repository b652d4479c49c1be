//! Callback declarations and the request/response pair the resolver
//! exchanges with the injected invoker.
//!
//! A callback is a descriptor-declared dependency lookup: its mappings name
//! the source fields whose current values feed the outgoing call, and where
//! each parameter lands in that call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::attribute::{AttributeContent, AttributeContentType, AttributeDescriptor};

/// Where a mapped parameter is placed in the outgoing call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum CallbackTarget {
    PathVariable,
    QueryParameter,
    Body,
}

/// One parameter of a callback. `from` names another descriptor in the same
/// namespace whose current field value feeds the call; `value` is a literal
/// used when no `from` is given. A mapping with neither a resolvable `from`
/// nor a literal makes the whole callback inert until the dependency has a
/// value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<AttributeContentType>,
    pub targets: Vec<CallbackTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl CallbackMapping {
    pub fn source(from: &str, to: &str, targets: Vec<CallbackTarget>) -> Self {
        CallbackMapping {
            from: Some(from.to_string()),
            to: to.to_string(),
            attribute_type: None,
            targets,
            value: None,
        }
    }

    pub fn literal(to: &str, value: JsonValue, targets: Vec<CallbackTarget>) -> Self {
        CallbackMapping {
            from: None,
            to: to.to_string(),
            attribute_type: None,
            targets,
            value: Some(value),
        }
    }
}

/// The dependency lookup a descriptor declares against the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeCallback {
    pub callback_context: String,
    pub callback_method: String,
    pub mappings: Vec<CallbackMapping>,
}

impl AttributeCallback {
    pub fn new(callback_context: &str, callback_method: &str, mappings: Vec<CallbackMapping>) -> Self {
        AttributeCallback {
            callback_context: callback_context.to_string(),
            callback_method: callback_method.to_string(),
            mappings,
        }
    }
}

/// A fully resolved callback invocation, handed to the injected invoker.
/// Parameter maps are BTreeMaps so the call shape is deterministic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub context: String,
    pub method: String,
    pub path_variables: BTreeMap<String, JsonValue>,
    pub query_parameters: BTreeMap<String, JsonValue>,
    pub body: BTreeMap<String, JsonValue>,
}

impl CallbackRequest {
    pub fn new(context: &str, method: &str) -> Self {
        CallbackRequest {
            context: context.to_string(),
            method: method.to_string(),
            path_variables: BTreeMap::new(),
            query_parameters: BTreeMap::new(),
            body: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, target: CallbackTarget, name: &str, value: JsonValue) {
        let map = match target {
            CallbackTarget::PathVariable => &mut self.path_variables,
            CallbackTarget::QueryParameter => &mut self.query_parameters,
            CallbackTarget::Body => &mut self.body,
        };
        map.insert(name.to_string(), value);
    }
}

/// What a callback returns: a replacement option set for the dependent
/// descriptor, or additional ("group") descriptors to be rendered as if they
/// had been part of the original set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CallbackResponse {
    // Content first: an empty array is an empty option set, and a descriptor
    // array never parses as content items.
    Content(Vec<AttributeContent>),
    Descriptors(Vec<AttributeDescriptor>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_wire_shape() {
        let m: CallbackMapping = serde_json::from_str(
            r#"{"from": "ca", "to": "caId", "targets": ["pathVariable"]}"#,
        )
        .expect("failed to deserialise mapping");
        assert_eq!(m.from.as_deref(), Some("ca"));
        assert_eq!(m.targets, vec![CallbackTarget::PathVariable]);
        assert!(m.value.is_none());
    }

    #[test]
    fn test_request_insert_targets() {
        let mut req = CallbackRequest::new("coreGetTemplates", "GET");
        req.insert(CallbackTarget::PathVariable, "caId", serde_json::json!("CA1"));
        req.insert(CallbackTarget::QueryParameter, "page", serde_json::json!(1));
        req.insert(CallbackTarget::Body, "filter", serde_json::json!({"k": "v"}));
        assert_eq!(req.path_variables.get("caId"), Some(&serde_json::json!("CA1")));
        assert_eq!(req.query_parameters.get("page"), Some(&serde_json::json!(1)));
        assert_eq!(req.body.get("filter"), Some(&serde_json::json!({"k": "v"})));
    }

    #[test]
    fn test_response_untagged_discrimination() {
        let content: CallbackResponse =
            serde_json::from_str(r#"[{"value": "T1"}, {"value": "T2"}]"#)
                .expect("failed to deserialise content response");
        assert!(matches!(content, CallbackResponse::Content(ref v) if v.len() == 2));

        let descriptors: CallbackResponse = serde_json::from_str(
            r#"[{
                "uuid": "0a9ee1df-0410-4f27-a91c-e5c299d0b3a5",
                "name": "raProfile",
                "contentType": "STRING"
            }]"#,
        )
        .expect("failed to deserialise descriptor response");
        assert!(matches!(descriptors, CallbackResponse::Descriptors(ref v) if v.len() == 1));
    }
}
