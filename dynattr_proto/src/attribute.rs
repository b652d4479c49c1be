//! Attribute descriptors and their content.
//!
//! A descriptor is the server-defined schema for a single form field. The
//! backend owns these definitions; the console only renders and collects
//! against them, so everything here is a plain serde shape with camelCase
//! wire names.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::callback::AttributeCallback;

/// The closed set of content kinds a descriptor may declare. Each kind has
/// its own native representation and serialization rule in the engine's
/// content model.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeContentType {
    #[default]
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Secret,
    File,
    Credential,
    Codeblock,
    Object,
}

impl TryFrom<&str> for AttributeContentType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_uppercase().as_str() {
            "STRING" => Ok(AttributeContentType::String),
            "TEXT" => Ok(AttributeContentType::Text),
            "INTEGER" => Ok(AttributeContentType::Integer),
            "FLOAT" => Ok(AttributeContentType::Float),
            "BOOLEAN" => Ok(AttributeContentType::Boolean),
            "DATE" => Ok(AttributeContentType::Date),
            "DATETIME" => Ok(AttributeContentType::Datetime),
            "SECRET" => Ok(AttributeContentType::Secret),
            "FILE" => Ok(AttributeContentType::File),
            "CREDENTIAL" => Ok(AttributeContentType::Credential),
            "CODEBLOCK" => Ok(AttributeContentType::Codeblock),
            "OBJECT" => Ok(AttributeContentType::Object),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AttributeContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AttributeContentType::String => "STRING",
                AttributeContentType::Text => "TEXT",
                AttributeContentType::Integer => "INTEGER",
                AttributeContentType::Float => "FLOAT",
                AttributeContentType::Boolean => "BOOLEAN",
                AttributeContentType::Date => "DATE",
                AttributeContentType::Datetime => "DATETIME",
                AttributeContentType::Secret => "SECRET",
                AttributeContentType::File => "FILE",
                AttributeContentType::Credential => "CREDENTIAL",
                AttributeContentType::Codeblock => "CODEBLOCK",
                AttributeContentType::Object => "OBJECT",
            }
        )
    }
}

/// A plain scalar carried by a content item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            ScalarValue::Bool(b) => JsonValue::from(*b),
            ScalarValue::Int(i) => JsonValue::from(*i),
            ScalarValue::Float(f) => JsonValue::from(*f),
            ScalarValue::String(s) => JsonValue::from(s.as_str()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// One typed value carried by a descriptor or submitted by the user. Either a
/// plain scalar, or a structured reference where the UI label (`reference`)
/// differs from the transmitted identifier (`data`) - credentials and files
/// are the usual cases.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AttributeContent {
    Reference { reference: String, data: JsonValue },
    Scalar { value: ScalarValue },
}

impl AttributeContent {
    pub fn new_string(value: &str) -> Self {
        AttributeContent::Scalar {
            value: ScalarValue::String(value.to_string()),
        }
    }

    pub fn new_int(value: i64) -> Self {
        AttributeContent::Scalar {
            value: ScalarValue::Int(value),
        }
    }

    pub fn new_float(value: f64) -> Self {
        AttributeContent::Scalar {
            value: ScalarValue::Float(value),
        }
    }

    pub fn new_bool(value: bool) -> Self {
        AttributeContent::Scalar {
            value: ScalarValue::Bool(value),
        }
    }

    pub fn new_reference(reference: &str, data: JsonValue) -> Self {
        AttributeContent::Reference {
            reference: reference.to_string(),
            data,
        }
    }

    /// The identifier that is transmitted to the backend. For a scalar this
    /// is the scalar itself; for a reference it is `data`, never the label.
    pub fn data(&self) -> JsonValue {
        match self {
            AttributeContent::Scalar { value } => value.to_json(),
            AttributeContent::Reference { data, .. } => data.clone(),
        }
    }

    /// The human facing form, used for option labels.
    pub fn label(&self) -> String {
        match self {
            AttributeContent::Scalar { value } => value.to_string(),
            AttributeContent::Reference { reference, .. } => reference.clone(),
        }
    }
}

/// UI facing properties of a descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeProperties {
    pub label: String,
    pub required: bool,
    pub read_only: bool,
    pub visible: bool,
    pub list: bool,
    pub multi_select: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Default for AttributeProperties {
    fn default() -> Self {
        AttributeProperties {
            label: String::new(),
            required: false,
            read_only: false,
            visible: true,
            list: false,
            multi_select: false,
            group: None,
        }
    }
}

/// A regex constraint the backend attaches to STRING/TEXT descriptors,
/// enforced at collection time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Server-defined schema for one form field.
///
/// `uuid` is the stable server-assigned identity; `name` feeds the derived
/// field key. `content` doubles as the default value set and, for `list`
/// descriptors, as the option set the user selects from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDescriptor {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content_type: AttributeContentType,
    #[serde(default)]
    pub properties: AttributeProperties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<AttributeContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<AttributeCallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<AttributeConstraint>,
}

impl AttributeDescriptor {
    pub fn new(uuid: Uuid, name: &str, content_type: AttributeContentType) -> Self {
        AttributeDescriptor {
            uuid,
            name: name.to_string(),
            description: None,
            content_type,
            properties: AttributeProperties::default(),
            content: Vec::new(),
            callback: None,
            constraint: None,
        }
    }
}

/// The only entity that leaves the engine: one submitted attribute with its
/// typed content, embedded by domain actions into their own request bodies.
/// Constructed fresh on every collection pass.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectedAttribute {
    pub attribute_uuid: Uuid,
    pub content: Vec<AttributeContent>,
}

impl CollectedAttribute {
    pub fn new(attribute_uuid: Uuid, content: Vec<AttributeContent>) -> Self {
        CollectedAttribute {
            attribute_uuid,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trip() {
        let ct: AttributeContentType = serde_json::from_str("\"DATETIME\"")
            .expect("failed to deserialise content type");
        assert_eq!(ct, AttributeContentType::Datetime);
        assert_eq!(
            serde_json::to_string(&AttributeContentType::Codeblock)
                .expect("failed to serialise content type"),
            "\"CODEBLOCK\""
        );
        assert_eq!(AttributeContentType::try_from("credential"), Ok(AttributeContentType::Credential));
        assert_eq!(AttributeContentType::try_from("tneilatype"), Err(()));
    }

    #[test]
    fn test_content_untagged_shapes() {
        let scalar: AttributeContent =
            serde_json::from_str(r#"{"value": "CA1"}"#).expect("failed to deserialise scalar");
        assert_eq!(scalar, AttributeContent::new_string("CA1"));
        assert_eq!(scalar.data(), serde_json::json!("CA1"));

        let num: AttributeContent =
            serde_json::from_str(r#"{"value": 42}"#).expect("failed to deserialise int");
        assert_eq!(num, AttributeContent::new_int(42));

        let refc: AttributeContent = serde_json::from_str(
            r#"{"reference": "Server credential", "data": {"uuid": "aa-bb"}}"#,
        )
        .expect("failed to deserialise reference");
        assert_eq!(refc.label(), "Server credential");
        assert_eq!(refc.data(), serde_json::json!({"uuid": "aa-bb"}));
    }

    #[test]
    fn test_descriptor_defaults_from_wire() {
        // A minimal backend descriptor: properties and content absent.
        let d: AttributeDescriptor = serde_json::from_str(
            r#"{
                "uuid": "66c68b2f-d02c-4243-8013-7946e40fe321",
                "name": "port",
                "contentType": "INTEGER"
            }"#,
        )
        .expect("failed to deserialise descriptor");
        assert_eq!(d.name, "port");
        assert_eq!(d.content_type, AttributeContentType::Integer);
        assert!(d.properties.visible);
        assert!(!d.properties.required);
        assert!(d.content.is_empty());
        assert!(d.callback.is_none());
    }
}
