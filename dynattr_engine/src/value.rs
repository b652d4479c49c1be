//! The content model: what a form field holds, and how it is coerced into
//! backend content per the descriptor's declared content type.
//!
//! Coercion is exhaustive over [`AttributeContentType`] so that adding a
//! content kind forces a decision here rather than falling through to a
//! stringly default. Numeric input fails loudly - the backend distinguishes
//! "not set" from "set to nonsense", and silently submitting 0 would corrupt
//! the request.

use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use serde_json::Value as JsonValue;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::prelude::*;

/// The engine-side value of one bound form field.
///
/// `Text` carries raw input for STRING/TEXT/INTEGER/FLOAT/DATE/DATETIME/
/// SECRET/CODEBLOCK fields and the base64 payload captured at upload time
/// for FILE fields. Selections from an option set are carried as the chosen
/// content items themselves, in user selection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Unset,
    Text(String),
    Bool(bool),
    Content(AttributeContent),
    ContentList(Vec<AttributeContent>),
}

impl FieldValue {
    /// Empty for collection purposes: never set, blank input, or an empty
    /// selection. A descriptor absent from the form entirely reads as
    /// `Unset` and is therefore empty too.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Unset => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Bool(_) => false,
            FieldValue::Content(_) => false,
            FieldValue::ContentList(cs) => cs.is_empty(),
        }
    }

    /// The JSON form used when this field feeds a callback mapping. `None`
    /// means the mapping is unresolvable and the callback must be skipped.
    pub fn as_json(&self) -> Option<JsonValue> {
        match self {
            FieldValue::Unset => None,
            FieldValue::Text(s) if s.trim().is_empty() => None,
            FieldValue::Text(s) => Some(JsonValue::from(s.as_str())),
            FieldValue::Bool(b) => Some(JsonValue::from(*b)),
            FieldValue::Content(c) => Some(c.data()),
            FieldValue::ContentList(cs) if cs.is_empty() => None,
            FieldValue::ContentList(cs) => {
                Some(JsonValue::Array(cs.iter().map(|c| c.data()).collect()))
            }
        }
    }

    /// What `clear` resets a field to: the descriptor's first pre-populated
    /// content item for non-list descriptors, `Unset` otherwise. An option
    /// set is not a selection, so list descriptors always clear to `Unset`.
    pub fn default_for(d: &AttributeDescriptor) -> FieldValue {
        if d.properties.list {
            return FieldValue::Unset;
        }
        match d.content.first() {
            Some(c) => FieldValue::Content(c.clone()),
            None => FieldValue::Unset,
        }
    }
}

/// Coerce a field value into the content items submitted for `d`. The caller
/// is responsible for skipping empty values first; an empty value coerces to
/// an empty content list.
pub fn coerce(d: &AttributeDescriptor, value: &FieldValue) -> Result<Vec<AttributeContent>, ValidationError> {
    if d.properties.list {
        return coerce_selection(d, value);
    }
    match d.content_type {
        AttributeContentType::String
        | AttributeContentType::Text
        | AttributeContentType::Secret
        | AttributeContentType::Codeblock => coerce_text(d, value),
        AttributeContentType::Integer => coerce_integer(d, value),
        AttributeContentType::Float => coerce_float(d, value),
        AttributeContentType::Boolean => coerce_boolean(d, value),
        AttributeContentType::Date => coerce_date(d, value),
        AttributeContentType::Datetime => coerce_datetime(d, value),
        AttributeContentType::File => coerce_file(d, value),
        AttributeContentType::Credential | AttributeContentType::Object => {
            coerce_reference(d, value)
        }
    }
}

/// Selections pass through unchanged - they were taken from the descriptor's
/// option set and are already in wire form. Order is the user's selection
/// order.
fn coerce_selection(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        FieldValue::ContentList(cs) => {
            if !d.properties.multi_select && cs.len() > 1 {
                return Err(ValidationError::SingleValueExpected(d.name.clone()));
            }
            Ok(cs.clone())
        }
        _ => Err(ValidationError::ValueTypeMismatch(d.name.clone())),
    }
}

fn coerce_text(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Text(s) => {
            check_constraint(d, s)?;
            Ok(vec![AttributeContent::new_string(s)])
        }
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::ValueTypeMismatch(d.name.clone())),
    }
}

fn coerce_integer(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Text(s) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(vec![AttributeContent::new_int(i)]),
            Err(_) => Err(ValidationError::InvalidInteger(
                d.name.clone(),
                s.clone(),
            )),
        },
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::ValueTypeMismatch(d.name.clone())),
    }
}

fn coerce_float(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Text(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(vec![AttributeContent::new_float(v)]),
            _ => Err(ValidationError::InvalidFloat(d.name.clone(), s.clone())),
        },
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::ValueTypeMismatch(d.name.clone())),
    }
}

/// Checkbox state maps directly - anything else is a caller bug surfaced as
/// a validation error rather than a guess.
fn coerce_boolean(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Bool(b) => Ok(vec![AttributeContent::new_bool(*b)]),
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::BooleanRequired(d.name.clone())),
    }
}

fn coerce_date(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Text(s) => {
            let normalized = normalize_date(s)
                .ok_or_else(|| ValidationError::InvalidDate(d.name.clone(), s.clone()))?;
            Ok(vec![AttributeContent::new_string(&normalized)])
        }
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::ValueTypeMismatch(d.name.clone())),
    }
}

fn coerce_datetime(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Text(s) => {
            let normalized = normalize_datetime(s)
                .ok_or_else(|| ValidationError::InvalidDateTime(d.name.clone(), s.clone()))?;
            Ok(vec![AttributeContent::new_string(&normalized)])
        }
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::ValueTypeMismatch(d.name.clone())),
    }
}

/// FILE content must already be the base64 payload captured at upload time,
/// never a file-handle reference. Validated by decoding.
fn coerce_file(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Text(s) => {
            if general_purpose::STANDARD.decode(s.trim()).is_err() {
                return Err(ValidationError::InvalidFileContent(d.name.clone()));
            }
            Ok(vec![AttributeContent::new_string(s.trim())])
        }
        // Structured file content (payload plus name/mime metadata) passes
        // through unchanged.
        FieldValue::Content(c) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::ValueTypeMismatch(d.name.clone())),
    }
}

/// CREDENTIAL/OBJECT values must keep their structured reference - the
/// display label is never what the backend receives.
fn coerce_reference(
    d: &AttributeDescriptor,
    value: &FieldValue,
) -> Result<Vec<AttributeContent>, ValidationError> {
    match value {
        FieldValue::Unset => Ok(Vec::new()),
        FieldValue::Content(c @ AttributeContent::Reference { .. }) => Ok(vec![c.clone()]),
        _ => Err(ValidationError::ReferenceRequired(d.name.clone())),
    }
}

fn check_constraint(d: &AttributeDescriptor, input: &str) -> Result<(), ValidationError> {
    let Some(constraint) = &d.constraint else {
        return Ok(());
    };
    match Regex::new(&constraint.pattern) {
        Ok(re) => {
            if re.is_match(input) {
                Ok(())
            } else {
                Err(ValidationError::ConstraintViolation(
                    d.name.clone(),
                    constraint.pattern.clone(),
                ))
            }
        }
        Err(e) => {
            // The pattern is backend-supplied; a broken one must not brick
            // the form.
            warn!(attribute = %d.name, "ignoring unparseable constraint pattern: {}", e);
            Ok(())
        }
    }
}

/// Normalize date input to the `YYYY-MM-DD` form the backend expects.
fn normalize_date(input: &str) -> Option<String> {
    let fmt = format_description!("[year]-[month]-[day]");
    let date = Date::parse(input.trim(), &fmt).ok()?;
    date.format(&fmt).ok()
}

/// Normalize datetime input to RFC 3339. Accepts RFC 3339 with offset, and
/// the offset-less `datetime-local` input shape (with or without seconds),
/// which is read as UTC.
fn normalize_datetime(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if let Ok(odt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return odt.format(&Rfc3339).ok();
    }
    // datetime-local omits seconds unless the user typed them.
    let padded = if trimmed.len() == 16 {
        format!("{}:00", trimmed)
    } else {
        trimmed.to_string()
    };
    let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let pdt = PrimitiveDateTime::parse(&padded, &fmt).ok()?;
    pdt.assume_utc().format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(ct: AttributeContentType) -> AttributeDescriptor {
        AttributeDescriptor::new(Uuid::new_v4(), "field", ct)
    }

    #[test]
    fn test_integer_coercion_fails_loudly() {
        let d = descriptor(AttributeContentType::Integer);
        let ok = coerce(&d, &FieldValue::Text(" 8080 ".to_string())).unwrap();
        assert_eq!(ok, vec![AttributeContent::new_int(8080)]);

        let err = coerce(&d, &FieldValue::Text("abc".to_string())).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidInteger("field".to_string(), "abc".to_string())
        );
    }

    #[test]
    fn test_float_rejects_non_finite() {
        let d = descriptor(AttributeContentType::Float);
        assert!(coerce(&d, &FieldValue::Text("2.5".to_string())).is_ok());
        assert!(coerce(&d, &FieldValue::Text("NaN".to_string())).is_err());
    }

    #[test]
    fn test_boolean_maps_checkbox_state() {
        let d = descriptor(AttributeContentType::Boolean);
        let out = coerce(&d, &FieldValue::Bool(true)).unwrap();
        assert_eq!(out, vec![AttributeContent::new_bool(true)]);
        assert!(coerce(&d, &FieldValue::Text("true".to_string())).is_err());
    }

    #[test]
    fn test_date_normalization() {
        let d = descriptor(AttributeContentType::Date);
        let out = coerce(&d, &FieldValue::Text("2026-08-08".to_string())).unwrap();
        assert_eq!(out, vec![AttributeContent::new_string("2026-08-08")]);
        assert!(coerce(&d, &FieldValue::Text("08/08/2026".to_string())).is_err());
    }

    #[test]
    fn test_datetime_normalization() {
        let d = descriptor(AttributeContentType::Datetime);
        // datetime-local without seconds reads as UTC.
        let out = coerce(&d, &FieldValue::Text("2026-08-08T12:30".to_string())).unwrap();
        assert_eq!(
            out,
            vec![AttributeContent::new_string("2026-08-08T12:30:00Z")]
        );
        let out = coerce(&d, &FieldValue::Text("2026-08-08T12:30:05Z".to_string())).unwrap();
        assert_eq!(
            out,
            vec![AttributeContent::new_string("2026-08-08T12:30:05Z")]
        );
        assert!(coerce(&d, &FieldValue::Text("yesterday".to_string())).is_err());
    }

    #[test]
    fn test_file_requires_base64_payload() {
        let d = descriptor(AttributeContentType::File);
        assert!(coerce(&d, &FieldValue::Text("aGVsbG8=".to_string())).is_ok());
        let err = coerce(&d, &FieldValue::Text("!!not-base64!!".to_string())).unwrap_err();
        assert_eq!(err, ValidationError::InvalidFileContent("field".to_string()));
    }

    #[test]
    fn test_credential_requires_reference() {
        let d = descriptor(AttributeContentType::Credential);
        let refc = AttributeContent::new_reference("My credential", serde_json::json!("cred-1"));
        let out = coerce(&d, &FieldValue::Content(refc.clone())).unwrap();
        assert_eq!(out, vec![refc]);

        let err = coerce(&d, &FieldValue::Text("My credential".to_string())).unwrap_err();
        assert_eq!(err, ValidationError::ReferenceRequired("field".to_string()));
    }

    #[test]
    fn test_selection_order_and_single_select() {
        let mut d = descriptor(AttributeContentType::String);
        d.properties.list = true;
        d.properties.multi_select = true;
        let a = AttributeContent::new_string("b-second");
        let b = AttributeContent::new_string("a-first");
        // Selection order is preserved, not sorted.
        let out = coerce(&d, &FieldValue::ContentList(vec![a.clone(), b.clone()])).unwrap();
        assert_eq!(out, vec![a.clone(), b.clone()]);

        d.properties.multi_select = false;
        let err = coerce(&d, &FieldValue::ContentList(vec![a, b])).unwrap_err();
        assert_eq!(err, ValidationError::SingleValueExpected("field".to_string()));
    }

    #[test]
    fn test_constraint_enforced_and_broken_pattern_ignored() {
        let mut d = descriptor(AttributeContentType::String);
        d.constraint = Some(AttributeConstraint {
            description: None,
            pattern: "^[a-z0-9-]+$".to_string(),
            error_message: None,
        });
        assert!(coerce(&d, &FieldValue::Text("my-connector".to_string())).is_ok());
        let err = coerce(&d, &FieldValue::Text("Not Valid!".to_string())).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ConstraintViolation("field".to_string(), "^[a-z0-9-]+$".to_string())
        );

        d.constraint = Some(AttributeConstraint {
            description: None,
            pattern: "([unclosed".to_string(),
            error_message: None,
        });
        assert!(coerce(&d, &FieldValue::Text("anything".to_string())).is_ok());
    }

    #[test]
    fn test_default_for_descriptor() {
        let mut d = descriptor(AttributeContentType::String);
        assert_eq!(FieldValue::default_for(&d), FieldValue::Unset);

        d.content = vec![AttributeContent::new_string("default")];
        assert_eq!(
            FieldValue::default_for(&d),
            FieldValue::Content(AttributeContent::new_string("default"))
        );

        d.properties.list = true;
        assert_eq!(FieldValue::default_for(&d), FieldValue::Unset);
    }

    #[test]
    fn test_as_json_uses_transmitted_data() {
        let refc = AttributeContent::new_reference("Label", serde_json::json!({"id": 7}));
        let v = FieldValue::Content(refc);
        assert_eq!(v.as_json(), Some(serde_json::json!({"id": 7})));
        assert_eq!(FieldValue::Unset.as_json(), None);
        assert_eq!(FieldValue::Text("  ".to_string()).as_json(), None);
    }
}
